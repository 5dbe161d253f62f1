use crate::collection::{Collection, Document};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::query::IntoQuery;
use crate::resultset::{DataOptions, Resultset, SimpleSortOptions, SortCriterion};
use crate::view::{DynamicView, DynamicViewOptions, FilterKind, RematerializeOptions, ViewSort};
use std::cmp::Ordering;
use std::sync::Arc;

/// Mutable access to one dynamic view of a collection.
///
/// The view needs the collection to evaluate its pipeline, and the
/// collection owns the view, so the handle borrows the collection and
/// addresses the view by slot.
pub struct DynamicViewHandle<'a> {
    collection: &'a mut Collection,
    slot: usize,
}

impl std::fmt::Debug for DynamicViewHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicViewHandle")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<'a> DynamicViewHandle<'a> {
    fn with_view<R>(&mut self, f: impl FnOnce(&mut DynamicView, &Collection) -> R) -> R {
        let mut views = std::mem::take(&mut self.collection.dynamic_views);
        let result = f(&mut views[self.slot], self.collection);
        self.collection.dynamic_views = views;
        result
    }

    pub fn view(&self) -> &DynamicView {
        &self.collection.dynamic_views[self.slot]
    }

    pub fn name(&self) -> &str {
        self.view().name()
    }

    pub fn count(&self) -> usize {
        self.view().count()
    }

    /// Adds a query filter, or replaces the filter registered under `uid`.
    pub fn apply_find<Q: IntoQuery>(&mut self, query: Q, uid: Option<&str>) -> LokiResult<()> {
        let query = query.into_query()?;
        self.with_view(|view, collection| view.apply_filter(FilterKind::Find(query), uid, collection))
    }

    /// Adds a predicate filter, or replaces the filter registered under
    /// `uid`.
    pub fn apply_where<P>(&mut self, predicate: P, uid: Option<&str>) -> LokiResult<()>
    where
        P: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        let kind = FilterKind::Where(Arc::new(predicate));
        self.with_view(|view, collection| view.apply_filter(kind, uid, collection))
    }

    pub fn remove_filter(&mut self, uid: &str) -> LokiResult<()> {
        self.with_view(|view, collection| view.remove_filter(uid, collection))
    }

    pub fn remove_filters(&mut self) -> LokiResult<()> {
        self.with_view(|view, collection| view.remove_filters(collection))
    }

    /// Re-runs the whole pipeline.
    pub fn rematerialize(&mut self, options: RematerializeOptions) -> LokiResult<()> {
        self.with_view(|view, collection| view.rematerialize(options, collection))
    }

    pub fn apply_simple_sort(&mut self, field: &str, options: SimpleSortOptions) {
        let sort = ViewSort::Simple {
            field: field.to_string(),
            options,
        };
        self.with_view(|view, collection| view.set_sort(sort, collection))
    }

    pub fn apply_sort_criteria(&mut self, criteria: Vec<SortCriterion>) {
        self.with_view(|view, collection| view.set_sort(ViewSort::Compound(criteria), collection))
    }

    pub fn apply_sort<F>(&mut self, comparator: F)
    where
        F: Fn(&Document, &Document) -> Ordering + Send + Sync + 'static,
    {
        let sort = ViewSort::Comparator(Arc::new(comparator));
        self.with_view(|view, collection| view.set_sort(sort, collection))
    }

    /// The view's documents in sort order.
    pub fn data(&mut self, options: DataOptions) -> Vec<Document> {
        self.with_view(|view, collection| view.data(collection, options))
    }

    /// An independent resultset over a copy of the view's current rows,
    /// optionally narrowed by a named transform of the collection. The
    /// view is never changed by what is done with the branch.
    pub fn branch_resultset(
        &mut self,
        transform: Option<&str>,
        params: &Document,
    ) -> LokiResult<Resultset<&Collection>> {
        let rows = self.with_view(|view, collection| view.sorted_rows(collection).to_vec());
        let resultset = Resultset::from_rows(&*self.collection, rows);
        match transform {
            Some(name) => resultset.transform_named(name, params),
            None => Ok(resultset),
        }
    }
}

impl Collection {
    /// Creates a dynamic view over every document. Fails if the name is
    /// taken.
    pub fn add_dynamic_view(
        &mut self,
        name: &str,
        options: DynamicViewOptions,
    ) -> LokiResult<DynamicViewHandle<'_>> {
        if self.get_dynamic_view(name).is_some() {
            log::error!("Dynamic view '{}' already exists in '{}'", name, self.name);
            return Err(LokiError::new(
                &format!("Dynamic view '{}' already exists in collection '{}'", name, self.name),
                ErrorKind::ViewAlreadyExists,
            ));
        }
        let view = DynamicView::new(name, options, self);
        self.dynamic_views.push(view);
        let slot = self.dynamic_views.len() - 1;
        Ok(DynamicViewHandle {
            collection: self,
            slot,
        })
    }

    pub fn get_dynamic_view(&self, name: &str) -> Option<&DynamicView> {
        self.dynamic_views.iter().find(|view| view.name() == name)
    }

    pub fn dynamic_view_mut(&mut self, name: &str) -> LokiResult<DynamicViewHandle<'_>> {
        match self.dynamic_views.iter().position(|view| view.name() == name) {
            Some(slot) => Ok(DynamicViewHandle {
                collection: self,
                slot,
            }),
            None => {
                log::error!("Dynamic view '{}' not found in '{}'", name, self.name);
                Err(LokiError::new(
                    &format!("Dynamic view '{}' not found in collection '{}'", name, self.name),
                    ErrorKind::ViewNotFound,
                ))
            }
        }
    }

    pub fn remove_dynamic_view(&mut self, name: &str) -> bool {
        let before = self.dynamic_views.len();
        self.dynamic_views.retain(|view| view.name() != name);
        before != self.dynamic_views.len()
    }

    pub fn dynamic_view_names(&self) -> Vec<String> {
        self.dynamic_views.iter().map(|view| view.name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionOptions;
    use crate::common::Value;
    use crate::doc;
    use crate::query::field;
    use crate::resultset::TransformStep;
    use crate::view::SortPriority;

    fn numbers() -> Collection {
        let mut numbers = Collection::new("numbers", CollectionOptions::new().index("n"));
        numbers
            .insert((1..=10).map(|n| doc! { n: n, even: (n % 2 == 0) }).collect())
            .unwrap();
        numbers
    }

    fn ns(docs: &[Document]) -> Vec<i64> {
        docs.iter().filter_map(|d| d.resolve("n").as_i64()).collect()
    }

    #[test]
    fn test_new_view_covers_collection() {
        let mut numbers = numbers();
        let mut view = numbers.add_dynamic_view("all", DynamicViewOptions::new()).unwrap();
        assert_eq!(view.count(), 10);
        assert_eq!(view.data(DataOptions::default()).len(), 10);
        assert!(numbers.add_dynamic_view("all", DynamicViewOptions::new()).is_err());
    }

    #[test]
    fn test_apply_find_and_incremental_insert() {
        let mut numbers = numbers();
        let mut view = numbers.add_dynamic_view("evens", DynamicViewOptions::new()).unwrap();
        view.apply_find(doc! { even: true }, None).unwrap();
        assert_eq!(view.count(), 5);
        let runs = view.view().pipeline_evaluations();

        numbers.insert_one(doc! { n: 11, even: false }).unwrap();
        numbers.insert_one(doc! { n: 12, even: true }).unwrap();
        let view = numbers.get_dynamic_view("evens").unwrap();
        assert_eq!(view.count(), 6);
        assert_eq!(view.pipeline_evaluations(), runs);
        assert_eq!(view.document_evaluations(), 2);
    }

    #[test]
    fn test_update_moves_documents_in_and_out() {
        let mut numbers = numbers();
        numbers
            .add_dynamic_view("big", DynamicViewOptions::new())
            .unwrap()
            .apply_find(field("n").gt(5), None)
            .unwrap();

        let mut one = numbers.get(1).unwrap().clone();
        one.put("n", 100);
        numbers.update(one).unwrap();
        let mut ten = numbers.get(10).unwrap().clone();
        ten.put("n", 0);
        numbers.update(ten).unwrap();

        let view = numbers.get_dynamic_view("big").unwrap();
        assert_eq!(view.rows(), &[0, 5, 6, 7, 8]);
    }

    #[test]
    fn test_remove_renumbers_view_rows() {
        let mut numbers = numbers();
        numbers
            .add_dynamic_view("evens", DynamicViewOptions::new())
            .unwrap()
            .apply_find(doc! { even: true }, None)
            .unwrap();
        numbers.remove_many(&[1, 2, 3]).unwrap();
        let view = numbers.get_dynamic_view("evens").unwrap();
        assert_eq!(view.rows(), &[0, 2, 4, 6]);
        let mut view = numbers.dynamic_view_mut("evens").unwrap();
        assert_eq!(ns(&view.data(DataOptions::default())), vec![4, 6, 8, 10]);
    }

    #[test]
    fn test_sorted_view_stays_sorted() {
        let mut numbers = numbers();
        {
            let mut view = numbers.add_dynamic_view("desc", DynamicViewOptions::new()).unwrap();
            view.apply_find(doc! { even: true }, None).unwrap();
            view.apply_simple_sort("n", SimpleSortOptions::new().desc(true));
            assert_eq!(ns(&view.data(DataOptions::default())), vec![10, 8, 6, 4, 2]);
        }
        numbers.insert_one(doc! { n: 5, even: true }).unwrap();
        let mut view = numbers.dynamic_view_mut("desc").unwrap();
        assert_eq!(ns(&view.data(DataOptions::default())), vec![10, 8, 6, 5, 4, 2]);
    }

    #[test]
    fn test_persistent_view_defers_resort_on_update() {
        let mut numbers = numbers();
        {
            let options = DynamicViewOptions::new().persistent(true);
            let mut view = numbers.add_dynamic_view("p", options).unwrap();
            view.apply_find(field("n").lte(3), None).unwrap();
            view.apply_simple_sort("n", SimpleSortOptions::new());
            assert_eq!(ns(&view.data(DataOptions::default())), vec![1, 2, 3]);
        }
        let mut one = numbers.get(1).unwrap().clone();
        one.put("n", 3);
        numbers.update(one).unwrap();
        assert!(numbers.get_dynamic_view("p").unwrap().is_sort_dirty());

        let mut view = numbers.dynamic_view_mut("p").unwrap();
        let data = view.data(DataOptions::default());
        assert_eq!(ns(&data), vec![2, 3, 3]);
        assert_eq!(view.view().result_data().len(), 3);
    }

    #[test]
    fn test_persistent_view_patches_result_data_on_write() {
        let mut numbers = numbers();
        numbers
            .add_dynamic_view("evens", DynamicViewOptions::new().persistent(true))
            .unwrap()
            .apply_find(doc! { even: true }, None)
            .unwrap();
        let stored = |numbers: &Collection| ns(numbers.get_dynamic_view("evens").unwrap().result_data());
        assert_eq!(stored(&numbers), vec![2, 4, 6, 8, 10]);

        numbers.insert_one(doc! { n: 12, even: true }).unwrap();
        numbers.insert_one(doc! { n: 13, even: false }).unwrap();
        assert_eq!(stored(&numbers), vec![2, 4, 6, 8, 10, 12]);

        let mut two = numbers.get(2).unwrap().clone();
        two.put("even", false);
        numbers.update(two).unwrap();
        let mut four = numbers.get(4).unwrap().clone();
        four.put("n", 40);
        numbers.update(four).unwrap();
        let mut three = numbers.get(3).unwrap().clone();
        three.put("even", true);
        numbers.update(three).unwrap();
        assert_eq!(stored(&numbers), vec![3, 40, 6, 8, 10, 12]);

        numbers.remove_many(&[6, 8]).unwrap();
        let view = numbers.get_dynamic_view("evens").unwrap();
        assert_eq!(ns(view.result_data()), vec![3, 40, 10, 12]);
        assert_eq!(view.rows(), &[2, 3, 7, 8]);
        assert_eq!(view.pipeline_evaluations(), 1);
    }

    #[test]
    fn test_sorted_persistent_view_keeps_result_data_aligned() {
        let mut numbers = numbers();
        {
            let options = DynamicViewOptions::new().persistent(true);
            let mut view = numbers.add_dynamic_view("desc", options).unwrap();
            view.apply_find(field("n").gt(6), None).unwrap();
            view.apply_simple_sort("n", SimpleSortOptions::new().desc(true));
            assert_eq!(ns(&view.data(DataOptions::default())), vec![10, 9, 8, 7]);
        }
        numbers.insert_one(doc! { n: 20 }).unwrap();
        numbers.insert_one(doc! { n: 1 }).unwrap();
        assert_eq!(
            ns(numbers.get_dynamic_view("desc").unwrap().result_data()),
            vec![20, 10, 9, 8, 7]
        );

        let mut nine = numbers.get(9).unwrap().clone();
        nine.put("n", 30);
        numbers.update(nine).unwrap();
        let view = numbers.get_dynamic_view("desc").unwrap();
        assert!(view.is_sort_dirty());
        assert_eq!(ns(view.result_data()), vec![20, 10, 30, 8, 7]);

        let mut view = numbers.dynamic_view_mut("desc").unwrap();
        assert_eq!(ns(&view.data(DataOptions::default())), vec![30, 20, 10, 8, 7]);
        assert_eq!(ns(view.view().result_data()), vec![30, 20, 10, 8, 7]);
    }

    #[test]
    fn test_active_priority_sorts_on_write() {
        let mut numbers = numbers();
        {
            let options = DynamicViewOptions::new().sort_priority(SortPriority::Active);
            let mut view = numbers.add_dynamic_view("a", options).unwrap();
            view.apply_sort(|a, b| b.resolve("n").as_i64().cmp(&a.resolve("n").as_i64()));
            assert!(!view.view().is_sort_dirty());
        }
        numbers.insert_one(doc! { n: 50 }).unwrap();
        let view = numbers.get_dynamic_view("a").unwrap();
        assert!(!view.is_sort_dirty());
        assert_eq!(view.rows().first(), Some(&10));
    }

    #[test]
    fn test_filters_by_uid() {
        let mut numbers = numbers();
        let mut view = numbers.add_dynamic_view("v", DynamicViewOptions::new()).unwrap();
        view.apply_find(field("n").gt(2), Some("low")).unwrap();
        view.apply_where(|doc| doc.resolve("even").as_bool() == Some(true), Some("even"))
            .unwrap();
        assert_eq!(view.count(), 4);
        view.apply_find(field("n").gt(6), Some("low")).unwrap();
        assert_eq!(view.count(), 2);
        view.rematerialize(RematerializeOptions { remove_where_filters: true }).unwrap();
        assert_eq!(view.count(), 4);
        assert_eq!(view.remove_filter("even").unwrap_err().kind(), &ErrorKind::FilterNotFound);
        view.remove_filters().unwrap();
        assert_eq!(view.count(), 10);
    }

    #[test]
    fn test_branch_is_independent() {
        let mut numbers = numbers();
        numbers
            .add_transform("top", vec![TransformStep::limit("[%lktxp]k")])
            .unwrap();
        let mut view = numbers.add_dynamic_view("evens", DynamicViewOptions::new()).unwrap();
        view.apply_find(doc! { even: true }, None).unwrap();

        let branch = view
            .branch_resultset(None, &Document::new())
            .unwrap()
            .find(field("n").gt(4))
            .unwrap();
        assert_eq!(branch.count(), 3);
        let top = view.branch_resultset(Some("top"), &doc! { k: 2 }).unwrap();
        assert_eq!(top.count(), 2);
        assert_eq!(top.first().map(|d| d.resolve("n").clone()), Some(Value::from(2)));
        assert_eq!(view.data(DataOptions::default()).len(), 5);
    }

    #[test]
    fn test_clear_and_remove_view() {
        let mut numbers = numbers();
        numbers.add_dynamic_view("v", DynamicViewOptions::new()).unwrap();
        numbers.clear();
        assert_eq!(numbers.get_dynamic_view("v").unwrap().count(), 0);
        assert!(numbers.remove_dynamic_view("v"));
        assert!(!numbers.remove_dynamic_view("v"));
        assert!(numbers.dynamic_view_mut("v").is_err());
    }
}
