use crate::collection::{Collection, Document};
use crate::common::{sort_helper, RemovalMap};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::persistence::{FilterSnapshot, SortSnapshot, DynamicViewSnapshot};
use crate::query::Query;
use crate::resultset::{compare_criteria, DataOptions, Resultset};
use crate::view::{DynamicViewOptions, FilterKind, FilterStep, RematerializeOptions, SortPriority, ViewSort};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};

/// A named filter and sort pipeline over a collection, kept in sync with
/// every write.
///
/// The view holds the positions of the matching documents. Inserts,
/// updates and removes evaluate only the affected document; the full
/// pipeline runs again only when the pipeline itself changes or on an
/// explicit rematerialize. `document_evaluations` and
/// `pipeline_evaluations` count the two kinds of work.
///
/// Unsorted views keep their rows in ascending position order. A sorted
/// view keeps its rows in sort order while the sort is clean; writes that
/// cannot cheaply keep it so mark the sort dirty and the next read sorts.
///
/// A persistent view also holds a copy of every matching document,
/// aligned with `rows`. Writes patch the affected entry; only a sort or a
/// full pipeline run copies the whole set again.
pub struct DynamicView {
    name: String,
    options: DynamicViewOptions,
    pipeline: Vec<FilterStep>,
    sort: Option<ViewSort>,
    rows: Vec<usize>,
    result_data: Vec<Document>,
    sort_dirty: bool,
    uid_counter: u64,
    document_evaluations: usize,
    pipeline_evaluations: usize,
}

impl DynamicView {
    pub(crate) fn new(name: &str, options: DynamicViewOptions, collection: &Collection) -> Self {
        DynamicView {
            name: name.to_string(),
            options,
            pipeline: Vec::new(),
            sort: None,
            rows: (0..collection.count()).collect(),
            result_data: if options.is_persistent() {
                collection.documents().to_vec()
            } else {
                Vec::new()
            },
            sort_dirty: false,
            uid_counter: 0,
            document_evaluations: 0,
            pipeline_evaluations: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &DynamicViewOptions {
        &self.options
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Positions of the matching documents. In sort order unless the sort
    /// is dirty.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn filter_pipeline(&self) -> &[FilterStep] {
        &self.pipeline
    }

    pub fn is_filtered(&self) -> bool {
        !self.pipeline.is_empty()
    }

    pub fn sort(&self) -> Option<&ViewSort> {
        self.sort.as_ref()
    }

    pub fn is_sort_dirty(&self) -> bool {
        self.sort_dirty
    }

    /// Materialized documents of a persistent view, in row order. Always
    /// empty for other views.
    pub fn result_data(&self) -> &[Document] {
        &self.result_data
    }

    /// Documents evaluated one at a time by write maintenance.
    pub fn document_evaluations(&self) -> usize {
        self.document_evaluations
    }

    /// Full pipeline runs over the collection.
    pub fn pipeline_evaluations(&self) -> usize {
        self.pipeline_evaluations
    }

    fn passes(&mut self, doc: &Document) -> bool {
        self.document_evaluations += 1;
        self.pipeline.iter().all(|step| step_matches(&step.kind, doc))
    }

    /// Runs the whole pipeline over the collection.
    pub(crate) fn materialize(&mut self, collection: &Collection) -> LokiResult<()> {
        self.pipeline_evaluations += 1;
        let data = collection.documents();

        let mut rows: Option<Vec<usize>> = None;
        for step in &self.pipeline {
            rows = Some(match (rows, &step.kind) {
                (None, FilterKind::Find(query)) => collection.find_positions(query)?,
                (None, FilterKind::Where(predicate)) => (0..data.len())
                    .filter(|p| predicate(&data[*p]))
                    .collect(),
                (Some(mut rows), kind) => {
                    rows.retain(|p| data.get(*p).is_some_and(|doc| step_matches(kind, doc)));
                    rows
                }
            });
        }
        self.rows = rows.unwrap_or_else(|| (0..data.len()).collect());
        log::debug!(
            "Materialized view '{}' over '{}': {} rows",
            self.name,
            collection.name(),
            self.rows.len()
        );

        self.sort_dirty = self.sort.is_some();
        if self.sort_dirty && self.options.priority() == SortPriority::Active {
            self.perform_sort(collection);
        } else {
            self.refresh_result_data(data);
        }
        Ok(())
    }

    /// Sorts the rows, letting a simple sort use the collection's index.
    pub(crate) fn perform_sort(&mut self, collection: &Collection) {
        let Some(sort) = self.sort.clone() else {
            self.sort_dirty = false;
            return;
        };
        let rows = std::mem::take(&mut self.rows);
        let resultset = Resultset::from_rows(collection, rows);
        self.rows = match &sort {
            ViewSort::Simple { field, options } => resultset.simplesort(field, *options).into_rows(),
            ViewSort::Compound(criteria) => resultset.compoundsort(criteria).into_rows(),
            ViewSort::Comparator(comparator) => resultset.sort(|a, b| comparator(a, b)).into_rows(),
        };
        self.sort_dirty = false;
        self.refresh_result_data(collection.documents());
    }

    fn sort_with_data(&mut self, data: &[Document]) {
        let mut rows = std::mem::take(&mut self.rows);
        rows.sort_by(|a, b| self.compare_positions(*a, *b, data));
        self.rows = rows;
        self.sort_dirty = false;
        self.refresh_result_data(data);
    }

    fn compare_positions(&self, a: usize, b: usize, data: &[Document]) -> Ordering {
        match (&self.sort, data.get(a), data.get(b)) {
            (Some(ViewSort::Simple { field, options }), Some(x), Some(y)) => {
                sort_helper(x.resolve(field), y.resolve(field), options.is_desc())
            }
            (Some(ViewSort::Compound(criteria)), Some(x), Some(y)) => compare_criteria(x, y, criteria),
            (Some(ViewSort::Comparator(comparator)), Some(x), Some(y)) => comparator(x, y),
            _ => a.cmp(&b),
        }
    }

    /// Copies the matching documents of a persistent view again.
    fn refresh_result_data(&mut self, data: &[Document]) {
        if self.options.is_persistent() {
            self.result_data = self.rows.iter().filter_map(|p| data.get(*p)).cloned().collect();
        }
    }

    /// Adds `position` at its place in the rows and returns the slot used.
    fn insert_row(&mut self, position: usize, data: &[Document]) -> Option<usize> {
        let slot = if self.sort.is_none() {
            self.rows.binary_search(&position).err()?
        } else if self.sort_dirty {
            self.rows.len()
        } else {
            self.rows
                .partition_point(|row| self.compare_positions(*row, position, data) != Ordering::Greater)
        };
        self.rows.insert(slot, position);
        Some(slot)
    }

    /// Adds `position` to the rows, and its document to `result_data`.
    fn add_row(&mut self, position: usize, doc: &Document, data: &[Document]) {
        if let Some(slot) = self.insert_row(position, data) {
            if self.options.is_persistent() && slot <= self.result_data.len() {
                self.result_data.insert(slot, doc.clone());
            }
        }
    }

    fn remove_row(&mut self, slot: usize) {
        self.rows.remove(slot);
        if slot < self.result_data.len() {
            self.result_data.remove(slot);
        }
    }

    fn row_slot(&self, position: usize) -> Option<usize> {
        if self.sort.is_none() {
            self.rows.binary_search(&position).ok()
        } else {
            self.rows.iter().position(|row| *row == position)
        }
    }

    fn settle(&mut self, data: &[Document]) {
        if self.sort_dirty && self.options.priority() == SortPriority::Active {
            self.sort_with_data(data);
        }
    }

    /// `data[position]` was just appended.
    pub(crate) fn on_insert(&mut self, position: usize, data: &[Document]) {
        let Some(doc) = data.get(position) else {
            return;
        };
        if self.passes(doc) {
            self.add_row(position, doc, data);
            self.settle(data);
        }
    }

    /// `data[position]` was just replaced.
    pub(crate) fn on_update(&mut self, position: usize, data: &[Document]) {
        let Some(doc) = data.get(position) else {
            return;
        };
        let passes = self.passes(doc);
        match (self.row_slot(position), passes) {
            (Some(slot), true) => {
                let sorted = self.sort.is_some() && !self.sort_dirty;
                if self.options.is_persistent() {
                    self.sort_dirty |= sorted;
                    if let Some(stored) = self.result_data.get_mut(slot) {
                        *stored = doc.clone();
                    }
                } else if sorted {
                    self.rows.remove(slot);
                    self.insert_row(position, data);
                }
            }
            (Some(slot), false) => self.remove_row(slot),
            (None, true) => self.add_row(position, doc, data),
            (None, false) => return,
        }
        self.settle(data);
    }

    /// Drops removed rows and renumbers the rest. Row order is kept.
    pub(crate) fn on_remove(&mut self, removals: &RemovalMap) {
        if self.options.is_persistent() {
            let stored = std::mem::take(&mut self.result_data);
            let (rows, result_data): (Vec<usize>, Vec<Document>) = self
                .rows
                .iter()
                .zip(stored)
                .filter_map(|(p, doc)| removals.remap(*p).map(|p| (p, doc)))
                .unzip();
            self.rows = rows;
            self.result_data = result_data;
        } else {
            self.rows = self.rows.iter().filter_map(|p| removals.remap(*p)).collect();
        }
    }

    pub(crate) fn on_clear(&mut self) {
        self.rows.clear();
        self.result_data.clear();
        self.sort_dirty = false;
    }

    fn next_uid(&mut self) -> String {
        loop {
            self.uid_counter += 1;
            let uid = self.uid_counter.to_string();
            if !self.pipeline.iter().any(|step| step.uid == uid) {
                return uid;
            }
        }
    }

    /// Appends a filter, or replaces the filter with the same `uid`, then
    /// rematerializes.
    pub(crate) fn apply_filter(
        &mut self,
        kind: FilterKind,
        uid: Option<&str>,
        collection: &Collection,
    ) -> LokiResult<()> {
        let existing = uid.and_then(|uid| self.pipeline.iter().position(|step| step.uid == uid));
        match existing {
            Some(slot) => self.pipeline[slot].kind = kind,
            None => {
                let uid = match uid {
                    Some(uid) => uid.to_string(),
                    None => self.next_uid(),
                };
                self.pipeline.push(FilterStep { uid, kind });
            }
        }
        self.materialize(collection)
    }

    pub(crate) fn remove_filter(&mut self, uid: &str, collection: &Collection) -> LokiResult<()> {
        let Some(slot) = self.pipeline.iter().position(|step| step.uid == uid) else {
            log::error!("View '{}' has no filter with uid '{}'", self.name, uid);
            return Err(LokiError::new(
                &format!("Dynamic view '{}' has no filter with uid '{}'", self.name, uid),
                ErrorKind::FilterNotFound,
            ));
        };
        self.pipeline.remove(slot);
        self.materialize(collection)
    }

    pub(crate) fn remove_filters(&mut self, collection: &Collection) -> LokiResult<()> {
        self.pipeline.clear();
        self.materialize(collection)
    }

    pub(crate) fn rematerialize(
        &mut self,
        options: RematerializeOptions,
        collection: &Collection,
    ) -> LokiResult<()> {
        if options.remove_where_filters {
            self.pipeline.retain(|step| !step.is_where());
        }
        self.materialize(collection)
    }

    pub(crate) fn set_sort(&mut self, sort: ViewSort, collection: &Collection) {
        self.sort = Some(sort);
        self.sort_dirty = true;
        if self.options.priority() == SortPriority::Active {
            self.perform_sort(collection);
        }
    }

    /// Sorted rows, sorting first if needed.
    pub(crate) fn sorted_rows(&mut self, collection: &Collection) -> &[usize] {
        if self.sort_dirty {
            self.perform_sort(collection);
        }
        &self.rows
    }

    pub(crate) fn data(&mut self, collection: &Collection, options: DataOptions) -> Vec<Document> {
        if self.sort_dirty {
            self.perform_sort(collection);
        }
        let data = collection.documents();
        let strip = |doc: &Document| {
            if options.remove_meta {
                doc.without_meta()
            } else {
                doc.clone()
            }
        };

        if self.options.is_persistent() {
            return self.result_data.iter().map(strip).collect();
        }
        self.rows.iter().filter_map(|p| data.get(*p)).map(strip).collect()
    }

    /// Find steps and index-free sorts. `where` steps and comparator sorts
    /// are code and are left out.
    pub(crate) fn to_snapshot(&self) -> DynamicViewSnapshot {
        DynamicViewSnapshot {
            name: self.name.clone(),
            options: self.options,
            filter_pipeline: self
                .pipeline
                .iter()
                .filter_map(|step| match &step.kind {
                    FilterKind::Find(query) => Some(FilterSnapshot {
                        uid: step.uid.clone(),
                        query: query.to_document(),
                    }),
                    FilterKind::Where(_) => None,
                })
                .collect(),
            sort: match &self.sort {
                Some(ViewSort::Simple { field, options }) => Some(SortSnapshot::Simple {
                    field: field.clone(),
                    options: *options,
                }),
                Some(ViewSort::Compound(criteria)) => Some(SortSnapshot::Compound {
                    criteria: criteria.clone(),
                }),
                _ => None,
            },
        }
    }

    pub(crate) fn from_snapshot(snapshot: &DynamicViewSnapshot, collection: &Collection) -> LokiResult<Self> {
        let mut view = DynamicView::new(&snapshot.name, snapshot.options, collection);
        for filter in &snapshot.filter_pipeline {
            view.pipeline.push(FilterStep {
                uid: filter.uid.clone(),
                kind: FilterKind::Find(Query::parse(&filter.query)?),
            });
        }
        view.uid_counter = view
            .pipeline
            .iter()
            .filter_map(|step| step.uid.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        view.sort = snapshot.sort.as_ref().map(|sort| match sort {
            SortSnapshot::Simple { field, options } => ViewSort::Simple {
                field: field.clone(),
                options: *options,
            },
            SortSnapshot::Compound { criteria } => ViewSort::Compound(criteria.clone()),
        });
        view.materialize(collection)?;
        Ok(view)
    }
}

fn step_matches(kind: &FilterKind, doc: &Document) -> bool {
    match kind {
        FilterKind::Find(query) => query.matches(doc),
        FilterKind::Where(predicate) => predicate(doc),
    }
}

impl Debug for DynamicView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicView")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("pipeline", &self.pipeline)
            .field("sort", &self.sort)
            .field("rows", &self.rows.len())
            .field("sort_dirty", &self.sort_dirty)
            .finish()
    }
}
