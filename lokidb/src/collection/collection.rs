use crate::collection::{CollectionEventInfo, CollectionEventListener, CollectionEvents, CollectionOptions, Document};
use crate::common::{EventAware, LokiEventBus, SubscriberRef, Value};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::index::{BinaryIndex, IndexRange, IndexStrategy, RangeBound, UniqueIndex};
use crate::resultset::TransformStep;
use crate::view::DynamicView;
use indexmap::IndexMap;
use std::fmt::{Debug, Formatter};

/// A named set of documents with its indices and dynamic views.
///
/// Documents live in `data` in insertion order. Ids are assigned from a
/// monotonically increasing counter, so `data` is also sorted by id and the
/// parallel `id_index` array makes `get(id)` a binary search.
///
/// Every structure that refers to documents by position (binary indices,
/// dynamic views, resultsets) is renumbered in the same pass that removes
/// documents from `data`.
pub struct Collection {
    pub(crate) name: String,
    pub(crate) options: CollectionOptions,
    pub(crate) data: Vec<Document>,
    pub(crate) id_index: Vec<i64>,
    pub(crate) max_id: i64,
    pub(crate) binary_indices: IndexMap<String, BinaryIndex>,
    pub(crate) unique_indices: IndexMap<String, UniqueIndex>,
    pub(crate) dynamic_views: Vec<DynamicView>,
    pub(crate) transforms: IndexMap<String, Vec<TransformStep>>,
    pub(crate) event_bus: LokiEventBus<CollectionEventInfo, CollectionEventListener>,
}

impl Collection {
    pub fn new(name: &str, options: CollectionOptions) -> Self {
        let mut collection = Collection {
            name: name.to_string(),
            options: options.clone(),
            data: Vec::new(),
            id_index: Vec::new(),
            max_id: 0,
            binary_indices: IndexMap::new(),
            unique_indices: IndexMap::new(),
            dynamic_views: Vec::new(),
            transforms: IndexMap::new(),
            event_bus: LokiEventBus::new(),
        };

        for field in options.indexed_fields() {
            collection.ensure_index(field, false);
        }
        for field in options.unique_fields() {
            collection
                .unique_indices
                .insert(field.clone(), UniqueIndex::new(field));
        }
        collection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Number of documents.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All documents in position order.
    pub fn documents(&self) -> &[Document] {
        &self.data
    }

    /// Ids in position order.
    pub fn id_index(&self) -> &[i64] {
        &self.id_index
    }

    /// Highest id ever assigned. Never decreases, not even on `clear`.
    pub fn max_id(&self) -> i64 {
        self.max_id
    }

    /// Current position of the document with `id`.
    pub fn position_of(&self, id: i64) -> Option<usize> {
        self.id_index.binary_search(&id).ok()
    }

    pub fn get(&self, id: i64) -> Option<&Document> {
        self.position_of(id).and_then(|p| self.data.get(p))
    }

    /// Like [Collection::get], also returning the document's position.
    pub fn get_with_position(&self, id: i64) -> Option<(usize, &Document)> {
        let position = self.position_of(id)?;
        self.data.get(position).map(|doc| (position, doc))
    }

    /// Looks up a document through the unique index on `field`.
    pub fn by<T: Into<Value>>(&self, field: &str, key: T) -> LokiResult<Option<&Document>> {
        let Some(index) = self.unique_indices.get(field) else {
            log::error!("No unique index on '{}' in collection '{}'", field, self.name);
            return Err(LokiError::new(
                &format!("No unique index on '{}' in collection '{}'", field, self.name),
                ErrorKind::IndexNotFound,
            ));
        };
        Ok(index.get(&key.into()).and_then(|id| self.get(id)))
    }

    /// Creates the binary index on `field` if needed and rebuilds it when it
    /// is dirty or `force` is set.
    pub fn ensure_index(&mut self, field: &str, force: bool) {
        let adaptive = self.options.is_adaptive();
        let index = self
            .binary_indices
            .entry(field.to_string())
            .or_insert_with(|| BinaryIndex::new(field, adaptive));
        index.ensure(&self.data, force);
    }

    pub fn ensure_all_indexes(&mut self, force: bool) {
        for index in self.binary_indices.values_mut() {
            index.ensure(&self.data, force);
        }
    }

    /// Returns false when there was no index on `field`.
    pub fn drop_index(&mut self, field: &str) -> bool {
        self.binary_indices.shift_remove(field).is_some()
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.binary_indices.contains_key(field)
    }

    pub fn binary_index(&self, field: &str) -> Option<&BinaryIndex> {
        self.binary_indices.get(field)
    }

    /// The sorted position array of the index on `field`.
    pub fn binary_index_values(&self, field: &str) -> Option<&[usize]> {
        self.binary_indices.get(field).map(BinaryIndex::values)
    }

    pub fn binary_index_names(&self) -> Vec<String> {
        self.binary_indices.keys().cloned().collect()
    }

    /// Range of index slots matching `bound` on the clean index on `field`.
    pub fn calculate_range(&self, field: &str, bound: RangeBound) -> LokiResult<IndexRange> {
        self.require_index(field)?.calculate_range(bound, &self.data)
    }

    fn require_index(&self, field: &str) -> LokiResult<&BinaryIndex> {
        self.binary_indices.get(field).ok_or_else(|| {
            log::error!("No binary index on '{}' in collection '{}'", field, self.name);
            LokiError::new(
                &format!("No binary index on '{}' in collection '{}'", field, self.name),
                ErrorKind::IndexNotFound,
            )
        })
    }

    /// Switches every binary index between adaptive maintenance and
    /// dirty-on-write.
    pub fn set_adaptive_binary_indices(&mut self, adaptive: bool) {
        self.options = self.options.clone().adaptive_binary_indices(adaptive);
        for index in self.binary_indices.values_mut() {
            index.set_adaptive(adaptive);
        }
    }

    /// Adds a unique index on `field` built from the current documents.
    /// Fails, leaving no index behind, if two documents share a key.
    pub fn ensure_unique_index(&mut self, field: &str) -> LokiResult<()> {
        if self.unique_indices.contains_key(field) {
            return Ok(());
        }
        let mut index = UniqueIndex::new(field);
        index.rebuild(&self.data)?;
        self.unique_indices.insert(field.to_string(), index);
        Ok(())
    }

    pub fn drop_unique_index(&mut self, field: &str) -> bool {
        self.unique_indices.shift_remove(field).is_some()
    }

    pub fn unique_index(&self, field: &str) -> Option<&UniqueIndex> {
        self.unique_indices.get(field)
    }

    pub fn unique_index_names(&self) -> Vec<String> {
        self.unique_indices.keys().cloned().collect()
    }

    /// Verifies the binary index on `field` is a sorted permutation of the
    /// data positions. With `repair`, an invalid index is rebuilt.
    /// Returns whether the index was valid.
    pub fn check_index(&mut self, field: &str, repair: bool) -> LokiResult<bool> {
        let valid = self.require_index(field)?.check(&self.data);
        if !valid {
            log::warn!("Binary index on '{}' in collection '{}' is corrupt", field, self.name);
            if repair {
                if let Some(index) = self.binary_indices.get_mut(field) {
                    index.mark_dirty(crate::index::DirtyReason::Repair);
                    index.rebuild(&self.data);
                }
            }
        }
        Ok(valid)
    }

    /// Checks every binary index and returns the fields that were invalid.
    pub fn check_all_indexes(&mut self, repair: bool) -> Vec<String> {
        let names = self.binary_index_names();
        names
            .into_iter()
            .filter(|field| !matches!(self.check_index(field, repair), Ok(true)))
            .collect()
    }

    pub fn has_listeners(&self) -> bool {
        self.event_bus.has_listeners()
    }

    /// Publishes an event to external listeners. Listener failures are
    /// logged and never undo the mutation that fired the event.
    pub(crate) fn emit(
        &self,
        event_type: CollectionEvents,
        documents: impl FnOnce() -> Vec<Document>,
        error: Option<LokiError>,
    ) {
        if !self.event_bus.has_listeners() {
            return;
        }
        let event = CollectionEventInfo::new(event_type, &self.name, documents(), error);
        if let Err(e) = self.event_bus.publish(event) {
            log::warn!(
                "Listener failed handling {:?} on collection '{}': {}",
                event_type,
                self.name,
                e
            );
        }
    }

    /// Publishes an `Error` event for a rejected operation and hands the
    /// error back for propagation.
    pub(crate) fn fail(&self, error: LokiError) -> LokiError {
        self.emit(CollectionEvents::Error, Vec::new, Some(error.clone()));
        error
    }
}

impl EventAware for Collection {
    fn subscribe(&self, listener: CollectionEventListener) -> LokiResult<SubscriberRef> {
        self.event_bus.register(listener)
    }

    fn unsubscribe(&self, subscriber: SubscriberRef) -> LokiResult<()> {
        self.event_bus.deregister(subscriber)
    }
}

impl Debug for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("count", &self.data.len())
            .field("max_id", &self.max_id)
            .field("binary_indices", &self.binary_indices.keys().collect::<Vec<_>>())
            .field("unique_indices", &self.unique_indices.keys().collect::<Vec<_>>())
            .field("dynamic_views", &self.dynamic_views.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::index::IndexState;

    fn weapons() -> Collection {
        let mut collection = Collection::new("weapons", CollectionOptions::new().index("name").unique("name"));
        collection
            .insert(vec![
                doc! { name: "mjolnir", owner: "thor" },
                doc! { name: "gungnir", owner: "odin" },
                doc! { name: "tyrfing", owner: "Svafrlami" },
                doc! { name: "draupnir", owner: "odin" },
            ])
            .unwrap();
        collection
    }

    #[test]
    fn test_new_collection_builds_declared_indices() {
        let collection = Collection::new("c", CollectionOptions::new().index("a"));
        assert_eq!(collection.binary_index("a").map(|i| i.state()), Some(IndexState::Clean));
        assert!(collection.is_empty());
    }

    #[test]
    fn test_get_by_id_and_position() {
        let collection = weapons();
        assert_eq!(collection.id_index(), &[1, 2, 3, 4]);
        let (position, doc) = collection.get_with_position(3).unwrap();
        assert_eq!(position, 2);
        assert_eq!(doc.get("name"), Some(&Value::from("tyrfing")));
        assert!(collection.get(99).is_none());
    }

    #[test]
    fn test_unique_lookup() {
        let collection = weapons();
        let doc = collection.by("name", "gungnir").unwrap().unwrap();
        assert_eq!(doc.id(), Some(2));
        assert!(collection.by("owner", "odin").is_err());
    }

    #[test]
    fn test_index_values_and_range() {
        let collection = weapons();
        assert_eq!(collection.binary_index_values("name"), Some(&[3usize, 1, 0, 2][..]));
        let missing = Value::from("nonexistent");
        let range = collection.calculate_range("name", RangeBound::Eq(&missing)).unwrap();
        assert_eq!(range, IndexRange::EMPTY);
        assert!(collection.calculate_range("owner", RangeBound::Eq(&missing)).is_err());
    }

    #[test]
    fn test_check_index_repairs() {
        let mut collection = weapons();
        collection.data.swap(0, 1);
        assert!(!collection.check_index("name", true).unwrap());
        assert!(collection.check_index("name", false).unwrap());
        assert!(collection.check_all_indexes(false).is_empty());
    }

    #[test]
    fn test_ensure_unique_index_rejects_existing_duplicates() {
        let mut collection = weapons();
        let err = collection.ensure_unique_index("owner").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DuplicateKey);
        assert!(collection.unique_index("owner").is_none());
    }
}
