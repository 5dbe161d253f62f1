use crate::collection::{Collection, Document};
use crate::common::{sort_helper, INDEX_INTERSECT_RATIO};
use crate::errors::LokiResult;
use crate::query::{IntoQuery, Query};
use crate::resultset::{DataOptions, SimpleSortOptions, SortCriterion};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};

/// A chainable view over a collection: an ordered list of data positions
/// narrowed and reordered by each stage.
///
/// A fresh resultset is unfiltered and stands for the whole collection
/// without materializing it. The first `find` on an unfiltered resultset
/// may be answered by a binary index.
///
/// `C` is how the collection is held: `&Collection` for read-only chains,
/// `&mut Collection` for chains ending in [Resultset::update] or
/// [Resultset::remove], and `Box<Collection>` for resultsets that own
/// their data, such as join output.
pub struct Resultset<C: Deref<Target = Collection>> {
    collection: C,
    filtered_rows: Vec<usize>,
    filter_initialized: bool,
}

impl<C: Deref<Target = Collection>> Resultset<C> {
    pub fn new(collection: C) -> Self {
        Resultset {
            collection,
            filtered_rows: Vec::new(),
            filter_initialized: false,
        }
    }

    /// A filtered resultset over exactly `rows`, in that order.
    pub fn from_rows(collection: C, rows: Vec<usize>) -> Self {
        Resultset {
            collection,
            filtered_rows: rows,
            filter_initialized: true,
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn is_filtered(&self) -> bool {
        self.filter_initialized
    }

    /// The current position list, materialized.
    pub fn rows(&self) -> Vec<usize> {
        if self.filter_initialized {
            self.filtered_rows.clone()
        } else {
            (0..self.collection.count()).collect()
        }
    }

    pub fn into_rows(self) -> Vec<usize> {
        if self.filter_initialized {
            self.filtered_rows
        } else {
            (0..self.collection.count()).collect()
        }
    }

    fn materialize(&mut self) {
        if !self.filter_initialized {
            self.filtered_rows = (0..self.collection.count()).collect();
            self.filter_initialized = true;
        }
    }

    /// Back to the whole collection.
    pub fn reset(mut self) -> Self {
        self.filtered_rows.clear();
        self.filter_initialized = false;
        self
    }

    pub fn count(&self) -> usize {
        if self.filter_initialized {
            self.filtered_rows.len()
        } else {
            self.collection.count()
        }
    }

    /// Narrows to the documents matching `query`.
    pub fn find<Q: IntoQuery>(mut self, query: Q) -> LokiResult<Self> {
        let query = query.into_query()?;
        self.apply_query(&query)?;
        Ok(self)
    }

    /// Narrows to the first document matching `query`.
    pub fn find_first<Q: IntoQuery>(mut self, query: Q) -> LokiResult<Self> {
        let query = query.into_query()?;
        self.apply_query(&query)?;
        self.filtered_rows.truncate(1);
        Ok(self)
    }

    fn apply_query(&mut self, query: &Query) -> LokiResult<()> {
        if query.is_all() {
            return Ok(());
        }
        if self.filter_initialized {
            let data = self.collection.documents();
            self.filtered_rows.retain(|p| data.get(*p).is_some_and(|doc| query.matches(doc)));
        } else {
            self.filtered_rows = self.collection.find_positions(query)?;
            self.filter_initialized = true;
        }
        Ok(())
    }

    /// Keeps the documents matching any of `queries`, ordered by the first
    /// query each one matched.
    pub fn find_or<Q: IntoQuery>(mut self, queries: Vec<Q>) -> LokiResult<Self> {
        let base = self.rows();
        let data = self.collection.documents();
        let mut included = vec![false; data.len()];
        let mut rows = Vec::new();
        for query in queries {
            let query = query.into_query()?;
            let matched = if self.filter_initialized {
                base.iter()
                    .copied()
                    .filter(|p| data.get(*p).is_some_and(|doc| query.matches(doc)))
                    .collect()
            } else {
                self.collection.find_positions(&query)?
            };
            for position in matched {
                if let Some(flag) = included.get_mut(position) {
                    if !*flag {
                        *flag = true;
                        rows.push(position);
                    }
                }
            }
        }
        self.filtered_rows = rows;
        self.filter_initialized = true;
        Ok(self)
    }

    /// Applies each query in turn.
    pub fn find_and<Q: IntoQuery>(mut self, queries: Vec<Q>) -> LokiResult<Self> {
        for query in queries {
            let query = query.into_query()?;
            self.apply_query(&query)?;
        }
        Ok(self)
    }

    /// Keeps the documents for which `predicate` holds. Never uses an index.
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Document) -> bool,
    {
        self.materialize();
        let data = self.collection.documents();
        self.filtered_rows
            .retain(|p| data.get(*p).is_some_and(|doc| predicate(doc)));
        self
    }

    /// Skips the first `count` rows.
    pub fn offset(mut self, count: usize) -> Self {
        self.materialize();
        let count = count.min(self.filtered_rows.len());
        self.filtered_rows.drain(..count);
        self
    }

    /// Keeps at most `count` rows.
    pub fn limit(mut self, count: usize) -> Self {
        self.materialize();
        self.filtered_rows.truncate(count);
        self
    }

    /// Sorts by one field under the loose ordering, using a clean binary
    /// index on the field when `options` allow.
    pub fn simplesort(mut self, field: &str, options: SimpleSortOptions) -> Self {
        let collection: &Collection = &self.collection;
        let index = collection
            .binary_index(field)
            .filter(|index| !index.is_dirty() && !options.is_index_disabled());

        if let Some(index) = index {
            if !self.filter_initialized {
                log::debug!("simplesort on '{}' reads index order", field);
                let mut rows = index.values().to_vec();
                if options.is_desc() {
                    rows.reverse();
                }
                self.filtered_rows = rows;
                self.filter_initialized = true;
                return self;
            }

            let total = collection.count();
            let filtered = self.filtered_rows.len();
            let intersect = options.is_index_intersect_forced()
                || (!options.is_index_intersect_disabled()
                    && filtered > 0
                    && total as f64 / filtered as f64 <= INDEX_INTERSECT_RATIO);
            if intersect {
                log::debug!(
                    "simplesort on '{}' intersects {} of {} rows with index",
                    field,
                    filtered,
                    total
                );
                let mut included = vec![false; total];
                for position in &self.filtered_rows {
                    if let Some(flag) = included.get_mut(*position) {
                        *flag = true;
                    }
                }
                let mut rows: Vec<usize> = index
                    .values()
                    .iter()
                    .copied()
                    .filter(|p| included.get(*p).copied().unwrap_or(false))
                    .collect();
                if options.is_desc() {
                    rows.reverse();
                }
                self.filtered_rows = rows;
                return self;
            }
        }

        log::debug!("simplesort on '{}' uses comparator sort", field);
        let desc = options.is_desc();
        self.sort_positions(|a, b| sort_helper(a.resolve(field), b.resolve(field), desc))
    }

    /// Sorts with an arbitrary comparator. Never uses an index.
    pub fn sort<F>(self, comparator: F) -> Self
    where
        F: Fn(&Document, &Document) -> Ordering,
    {
        self.sort_positions(comparator)
    }

    /// Sorts by several fields, each ascending or descending.
    pub fn compoundsort(self, criteria: &[SortCriterion]) -> Self {
        self.sort_positions(|a, b| compare_criteria(a, b, criteria))
    }

    fn sort_positions<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&Document, &Document) -> Ordering,
    {
        self.materialize();
        let data = self.collection.documents();
        self.filtered_rows.sort_by(|a, b| match (data.get(*a), data.get(*b)) {
            (Some(x), Some(y)) => comparator(x, y),
            _ => a.cmp(b),
        });
        self
    }

    /// Iterates the documents in row order.
    pub fn docs(&self) -> Box<dyn Iterator<Item = &Document> + '_> {
        let data = self.collection.documents();
        if self.filter_initialized {
            Box::new(self.filtered_rows.iter().filter_map(move |p| data.get(*p)))
        } else {
            Box::new(data.iter())
        }
    }

    /// Materializes the documents.
    pub fn data(&self, options: DataOptions) -> Vec<Document> {
        self.docs()
            .map(|doc| {
                if options.remove_meta {
                    doc.without_meta()
                } else {
                    doc.clone()
                }
            })
            .collect()
    }

    pub fn first(&self) -> Option<&Document> {
        self.docs().next()
    }

    /// Maps every document and hands the mapped values to `reduce`.
    pub fn map_reduce<T, R, M, F>(&self, map: M, reduce: F) -> R
    where
        M: Fn(&Document) -> T,
        F: FnOnce(Vec<T>) -> R,
    {
        reduce(self.docs().map(map).collect())
    }
}

impl<C> Resultset<C>
where
    C: Deref<Target = Collection> + Clone,
{
    /// An independent resultset over the same collection with a copy of
    /// the current rows.
    pub fn copy(&self) -> Self {
        Resultset {
            collection: self.collection.clone(),
            filtered_rows: self.filtered_rows.clone(),
            filter_initialized: self.filter_initialized,
        }
    }

    pub fn branch(&self) -> Self {
        self.copy()
    }
}

impl<C> Resultset<C>
where
    C: DerefMut<Target = Collection>,
{
    /// Applies `update` to every document in the resultset and stores the
    /// results through the collection's batch update.
    pub fn update<F>(mut self, update: F) -> LokiResult<Self>
    where
        F: FnMut(&mut Document),
    {
        let rows = self.rows();
        self.collection.update_positions(&rows, update)?;
        Ok(self)
    }

    /// Removes every document in the resultset in a single batch and
    /// returns them. The resultset is left unfiltered.
    pub fn remove(mut self) -> LokiResult<Vec<Document>> {
        let rows = self.rows();
        Ok(self.collection.remove_positions(rows))
    }
}

impl<C: Deref<Target = Collection>> Debug for Resultset<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resultset")
            .field("collection", &self.collection.name())
            .field("filtered_rows", &self.filtered_rows)
            .field("filter_initialized", &self.filter_initialized)
            .finish()
    }
}

pub(crate) fn compare_criteria(a: &Document, b: &Document, criteria: &[SortCriterion]) -> Ordering {
    for criterion in criteria {
        let ordering = sort_helper(a.resolve(&criterion.field), b.resolve(&criterion.field), criterion.desc);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionOptions;
    use crate::common::Value;
    use crate::doc;
    use crate::query::field;

    fn people() -> Collection {
        let mut people = Collection::new("people", CollectionOptions::new().index("age"));
        people
            .insert(vec![
                doc! { name: "odin", age: 900, realm: "asgard" },
                doc! { name: "thor", age: 35, realm: "asgard" },
                doc! { name: "loki", age: 29, realm: "jotunheim" },
                doc! { name: "sif", age: 41, realm: "asgard" },
                doc! { name: "frigg", age: 850, realm: "asgard" },
            ])
            .unwrap();
        people
    }

    fn names(resultset: &Resultset<&Collection>) -> Vec<String> {
        resultset
            .docs()
            .filter_map(|doc| doc.get("name").and_then(Value::as_str).map(String::from))
            .collect()
    }

    #[test]
    fn test_unfiltered_counts_whole_collection() {
        let people = people();
        let resultset = people.chain();
        assert!(!resultset.is_filtered());
        assert_eq!(resultset.count(), 5);
        assert_eq!(resultset.rows(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_find_narrows_chain() {
        let people = people();
        let resultset = people
            .chain()
            .find(doc! { realm: "asgard" })
            .unwrap()
            .find(field("age").lt(100))
            .unwrap();
        assert_eq!(names(&resultset), vec!["thor", "sif"]);
    }

    #[test]
    fn test_find_first_and_filter() {
        let people = people();
        let first = people.chain().find_first(doc! { realm: "asgard" }).unwrap();
        assert_eq!(names(&first), vec!["odin"]);
        let young = people.chain().filter(|doc| doc.resolve("age").as_i64() < Some(40));
        assert_eq!(names(&young), vec!["thor", "loki"]);
    }

    #[test]
    fn test_find_or_and_find_and() {
        let people = people();
        let either = people
            .chain()
            .find_or(vec![doc! { name: "sif" }, doc! { realm: "jotunheim" }, doc! { name: "sif" }])
            .unwrap();
        assert_eq!(names(&either), vec!["sif", "loki"]);
        let both = people
            .chain()
            .find_and(vec![doc! { realm: "asgard" }, doc! { age: { "$gt": 800 } }])
            .unwrap();
        assert_eq!(names(&both), vec!["odin", "frigg"]);
    }

    #[test]
    fn test_offset_limit() {
        let people = people();
        let page = people.chain().offset(1).limit(2);
        assert_eq!(names(&page), vec!["thor", "loki"]);
        assert_eq!(people.chain().offset(10).count(), 0);
    }

    #[test]
    fn test_simplesort_strategies_agree() {
        let people = people();
        let by_index = people.chain().simplesort("age", SimpleSortOptions::new());
        let by_comparator = people
            .chain()
            .simplesort("age", SimpleSortOptions::new().disable_index(true));
        assert_eq!(names(&by_index), vec!["loki", "thor", "sif", "frigg", "odin"]);
        assert_eq!(names(&by_index), names(&by_comparator));

        let filtered = || people.chain().find(doc! { realm: "asgard" }).unwrap();
        let intersect = filtered().simplesort("age", SimpleSortOptions::new().force_index_intersect(true).desc(true));
        let plain = filtered().simplesort("age", SimpleSortOptions::new().disable_index_intersect(true).desc(true));
        assert_eq!(names(&intersect), vec!["odin", "frigg", "sif", "thor"]);
        assert_eq!(names(&intersect), names(&plain));
    }

    #[test]
    fn test_compoundsort_and_sort() {
        let people = people();
        let sorted = people
            .chain()
            .compoundsort(&[SortCriterion::asc("realm"), SortCriterion::desc("age")]);
        assert_eq!(names(&sorted), vec!["odin", "frigg", "sif", "thor", "loki"]);
        let by_name = people.chain().sort(|a, b| {
            a.resolve("name")
                .as_str()
                .cmp(&b.resolve("name").as_str())
        });
        assert_eq!(names(&by_name), vec!["frigg", "loki", "odin", "sif", "thor"]);
    }

    #[test]
    fn test_data_strips_meta() {
        let people = people();
        let docs = people.chain().limit(1).data(DataOptions::without_meta());
        assert_eq!(docs, vec![doc! { name: "odin", age: 900, realm: "asgard" }]);
    }

    #[test]
    fn test_copy_is_independent() {
        let people = people();
        let base = people.chain().find(doc! { realm: "asgard" }).unwrap();
        let narrowed = base.copy().limit(1);
        assert_eq!(narrowed.count(), 1);
        assert_eq!(base.count(), 4);
    }

    #[test]
    fn test_map_reduce() {
        let people = people();
        let total = people
            .chain()
            .find(doc! { realm: "asgard" })
            .unwrap()
            .map_reduce(|doc| doc.resolve("age").as_i64().unwrap_or(0), |ages| ages.iter().sum::<i64>());
        assert_eq!(total, 900 + 35 + 41 + 850);
    }

    #[test]
    fn test_update_and_remove_write_back() {
        let mut people = people();
        people
            .chain_mut()
            .find(doc! { realm: "jotunheim" })
            .unwrap()
            .update(|doc| doc.put("realm", "asgard"))
            .unwrap();
        assert_eq!(people.count_where(doc! { realm: "asgard" }).unwrap(), 5);

        let removed = people
            .chain_mut()
            .find(field("age").gt(100))
            .unwrap()
            .remove()
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(people.count(), 3);
        assert_eq!(people.binary_index_values("age"), Some(&[1usize, 0, 2][..]));
    }
}
