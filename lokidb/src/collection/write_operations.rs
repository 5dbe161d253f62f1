use crate::collection::{Collection, CollectionEvents, Document};
use crate::common::{
    current_time_millis, RemovalMap, ValueKey, META_CREATED, META_REVISION, META_UPDATED,
    META_VERSION,
};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::query::IntoQuery;
use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

impl Collection {
    /// Inserts a single document and returns it with its id and metadata.
    pub fn insert_one(&mut self, document: Document) -> LokiResult<Document> {
        let mut inserted = self.insert(vec![document])?;
        inserted.pop().ok_or_else(|| {
            log::error!("Insert into '{}' returned no document", self.name);
            LokiError::new("Insert returned no document", ErrorKind::InternalError)
        })
    }

    /// Inserts a batch of documents.
    ///
    /// Unique constraints are validated for the whole batch before anything
    /// is stored, so a duplicate key rejects the batch and leaves the
    /// collection untouched.
    pub fn insert(&mut self, documents: Vec<Document>) -> LokiResult<Vec<Document>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        if documents.iter().any(Document::has_id) {
            log::error!("Document already carries an id, insert into '{}' rejected", self.name);
            return Err(self.fail(LokiError::new(
                "Document is already in a collection, use update instead",
                ErrorKind::InvalidDocument,
            )));
        }

        self.emit(CollectionEvents::PreInsert, || documents.clone(), None);

        if let Err(e) = self.validate_unique_inserts(&documents) {
            return Err(self.fail(e));
        }

        let meta_disabled = self.options.is_meta_disabled();
        let mut inserted = Vec::with_capacity(documents.len());
        for mut document in documents {
            self.max_id += 1;
            let id = self.max_id;
            document.set_id(id);
            if !meta_disabled {
                document.set_meta(new_meta());
            }

            let position = self.data.len();
            self.data.push(document);
            self.id_index.push(id);

            for index in self.binary_indices.values_mut() {
                index.adaptive_insert(position, &self.data);
            }
            for index in self.unique_indices.values_mut() {
                index.set(&self.data[position])?;
            }
            for view in self.dynamic_views.iter_mut() {
                view.on_insert(position, &self.data);
            }
            inserted.push(self.data[position].clone());
        }

        log::debug!("Inserted {} documents into '{}'", inserted.len(), self.name);
        self.emit(CollectionEvents::Insert, || inserted.clone(), None);
        Ok(inserted)
    }

    fn validate_unique_inserts(&self, documents: &[Document]) -> LokiResult<()> {
        for (field, index) in &self.unique_indices {
            let mut seen = HashSet::new();
            for document in documents {
                index.check(document, None)?;
                if let Some(key) = ValueKey::from_value(document.resolve(field)) {
                    if !seen.insert(key.clone()) {
                        return Err(duplicate_key(field, &key));
                    }
                }
            }
        }
        Ok(())
    }

    /// Replaces a stored document. The document must carry an id issued
    /// by this collection.
    pub fn update(&mut self, document: Document) -> LokiResult<Document> {
        let mut updated = self.update_many(vec![document])?;
        updated.pop().ok_or_else(|| {
            log::error!("Update in '{}' returned no document", self.name);
            LokiError::new("Update returned no document", ErrorKind::InternalError)
        })
    }

    /// Replaces a batch of stored documents.
    ///
    /// Unique constraints are checked against the state the whole batch
    /// would produce, so two documents may swap keys in one call. On any
    /// failure nothing is modified.
    pub fn update_many(&mut self, documents: Vec<Document>) -> LokiResult<Vec<Document>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut targets: IndexMap<i64, (usize, Document)> = IndexMap::new();
        for document in documents {
            let Some(id) = document.id() else {
                log::error!("Update on '{}' given a document without id", self.name);
                return Err(self.fail(LokiError::new(
                    "Trying to update a document without id, insert it first",
                    ErrorKind::UnsyncedDocument,
                )));
            };
            let Some(position) = self.position_of(id) else {
                log::error!("Update on '{}' given unknown id {}", self.name, id);
                return Err(self.fail(LokiError::new(
                    &format!("Document with id {} is not in collection '{}'", id, self.name),
                    ErrorKind::UnsyncedDocument,
                )));
            };
            targets.insert(id, (position, document));
        }

        self.emit(
            CollectionEvents::PreUpdate,
            || targets.values().map(|(_, d)| d.clone()).collect(),
            None,
        );

        if let Err(e) = self.validate_unique_updates(&targets) {
            return Err(self.fail(e));
        }

        let meta_disabled = self.options.is_meta_disabled();
        let now = current_time_millis();
        for (position, document) in targets.values_mut() {
            if !meta_disabled {
                let meta = next_revision(self.data[*position].meta(), now);
                document.set_meta(meta);
            }
        }

        for unique in self.unique_indices.values_mut() {
            for id in targets.keys() {
                unique.remove_by_id(*id);
            }
        }

        let mut updated = Vec::with_capacity(targets.len());
        for (_, (position, document)) in targets {
            for index in self.binary_indices.values_mut() {
                index.adaptive_update(position, &document, &self.data);
            }
            for unique in self.unique_indices.values_mut() {
                unique.set(&document)?;
            }
            self.data[position] = document;
            for view in self.dynamic_views.iter_mut() {
                view.on_update(position, &self.data);
            }
            updated.push(self.data[position].clone());
        }

        log::debug!("Updated {} documents in '{}'", updated.len(), self.name);
        self.emit(CollectionEvents::Update, || updated.clone(), None);
        Ok(updated)
    }

    fn validate_unique_updates(&self, targets: &IndexMap<i64, (usize, Document)>) -> LokiResult<()> {
        for (field, index) in &self.unique_indices {
            let mut claimed: HashMap<ValueKey, i64> = HashMap::new();
            for (id, (_, document)) in targets {
                let Some(key) = ValueKey::from_value(document.resolve(field)) else {
                    continue;
                };
                if let Some(other) = claimed.insert(key.clone(), *id) {
                    if other != *id {
                        return Err(duplicate_key(field, &key));
                    }
                }
                if let Some(owner) = index.get(document.resolve(field)) {
                    if owner != *id && !targets.contains_key(&owner) {
                        return Err(duplicate_key(field, &key));
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes the document with `id`, returning it.
    pub fn remove(&mut self, id: i64) -> LokiResult<Document> {
        let Some(position) = self.position_of(id) else {
            log::error!("Remove on '{}' given unknown id {}", self.name, id);
            return Err(self.fail(LokiError::new(
                &format!("Document with id {} is not in collection '{}'", id, self.name),
                ErrorKind::UnsyncedDocument,
            )));
        };
        let mut removed = self.remove_positions(vec![position]);
        removed.pop().ok_or_else(|| {
            log::error!("Remove in '{}' returned no document", self.name);
            LokiError::new("Remove returned no document", ErrorKind::InternalError)
        })
    }

    /// Removes a stored document, identified by its id.
    pub fn remove_document(&mut self, document: &Document) -> LokiResult<Document> {
        match document.id() {
            Some(id) => self.remove(id),
            None => {
                log::error!("Remove on '{}' given a document without id", self.name);
                Err(self.fail(LokiError::new(
                    "Trying to remove a document without id",
                    ErrorKind::UnsyncedDocument,
                )))
            }
        }
    }

    /// Removes every listed id in a single renumbering pass. Fails without
    /// removing anything if an id is unknown.
    pub fn remove_many(&mut self, ids: &[i64]) -> LokiResult<Vec<Document>> {
        let mut positions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.position_of(*id) {
                Some(position) => positions.push(position),
                None => {
                    log::error!("Remove on '{}' given unknown id {}", self.name, id);
                    return Err(self.fail(LokiError::new(
                        &format!("Document with id {} is not in collection '{}'", id, self.name),
                        ErrorKind::UnsyncedDocument,
                    )));
                }
            }
        }
        Ok(self.remove_positions(positions))
    }

    /// Removes the documents at `positions` and renumbers the data array,
    /// the id index, every binary index and every dynamic view against the
    /// same removal map.
    pub(crate) fn remove_positions(&mut self, positions: Vec<usize>) -> Vec<Document> {
        let len = self.data.len();
        let positions: Vec<usize> = positions
            .into_iter()
            .filter(|p| *p < len)
            .sorted_unstable()
            .dedup()
            .collect();
        if positions.is_empty() {
            return Vec::new();
        }

        let removals = RemovalMap::new(self.data.len(), &positions);

        for index in self.binary_indices.values_mut() {
            match positions.as_slice() {
                [single] => index.adaptive_remove(*single, &self.data),
                _ => index.adaptive_batch_remove(&removals),
            }
        }
        for unique in self.unique_indices.values_mut() {
            for position in &positions {
                unique.remove_by_id(self.id_index[*position]);
            }
        }
        for view in self.dynamic_views.iter_mut() {
            view.on_remove(&removals);
        }

        let data = std::mem::take(&mut self.data);
        let mut removed = Vec::with_capacity(positions.len());
        self.data = Vec::with_capacity(data.len() - positions.len());
        for (position, document) in data.into_iter().enumerate() {
            if removals.is_removed(position) {
                removed.push(document);
            } else {
                self.data.push(document);
            }
        }
        let mut position = 0;
        self.id_index.retain(|_| {
            let keep = !removals.is_removed(position);
            position += 1;
            keep
        });

        debug_assert_eq!(self.data.len(), self.id_index.len());
        debug_assert!(self
            .binary_indices
            .values()
            .all(|index| index.is_dirty() || index.values().len() == self.data.len()));

        log::debug!("Removed {} documents from '{}'", removed.len(), self.name);
        self.emit(CollectionEvents::Delete, || removed.clone(), None);
        removed
    }

    /// Removes every document. The id counter keeps running so ids are
    /// never reused.
    pub fn clear(&mut self) {
        let removed = std::mem::take(&mut self.data);
        self.id_index.clear();
        for index in self.binary_indices.values_mut() {
            index.rebuild(&self.data);
        }
        for unique in self.unique_indices.values_mut() {
            unique.clear();
        }
        for view in self.dynamic_views.iter_mut() {
            view.on_clear();
        }
        log::debug!("Cleared {} documents from '{}'", removed.len(), self.name);
        self.emit(CollectionEvents::Delete, || removed, None);
    }

    /// Applies `update` to a copy of every document matching `query` and
    /// stores the results as one batch.
    pub fn find_and_update<Q, F>(&mut self, query: Q, update: F) -> LokiResult<Vec<Document>>
    where
        Q: IntoQuery,
        F: FnMut(&mut Document),
    {
        let query = query.into_query()?;
        let positions = self.find_positions(&query)?;
        self.update_positions(&positions, update)
    }

    /// Like [Collection::find_and_update] with an arbitrary predicate.
    pub fn update_where<P, F>(&mut self, predicate: P, update: F) -> LokiResult<Vec<Document>>
    where
        P: Fn(&Document) -> bool,
        F: FnMut(&mut Document),
    {
        let positions: Vec<usize> = self
            .data
            .iter()
            .enumerate()
            .filter(|(_, doc)| predicate(doc))
            .map(|(p, _)| p)
            .collect();
        self.update_positions(&positions, update)
    }

    pub(crate) fn update_positions<F>(&mut self, positions: &[usize], mut update: F) -> LokiResult<Vec<Document>>
    where
        F: FnMut(&mut Document),
    {
        let documents = positions
            .iter()
            .filter_map(|p| self.data.get(*p))
            .map(|doc| {
                let mut copy = doc.clone();
                update(&mut copy);
                // the id is not up for modification
                if let Some(id) = doc.id() {
                    copy.set_id(id);
                }
                copy
            })
            .collect();
        self.update_many(documents)
    }

    /// Removes every document matching `query` in one batch.
    pub fn find_and_remove<Q: IntoQuery>(&mut self, query: Q) -> LokiResult<Vec<Document>> {
        let query = query.into_query()?;
        let positions = self.find_positions(&query)?;
        Ok(self.remove_positions(positions))
    }

    pub fn remove_where<P>(&mut self, predicate: P) -> Vec<Document>
    where
        P: Fn(&Document) -> bool,
    {
        let positions = self
            .data
            .iter()
            .enumerate()
            .filter(|(_, doc)| predicate(doc))
            .map(|(p, _)| p)
            .collect();
        self.remove_positions(positions)
    }
}

fn new_meta() -> Document {
    let mut meta = Document::new();
    meta.insert(META_REVISION, 0);
    meta.insert(META_CREATED, current_time_millis());
    meta.insert(META_VERSION, 0);
    meta
}

fn next_revision(previous: Option<&Document>, now: i64) -> Document {
    let mut meta = previous.cloned().unwrap_or_else(new_meta);
    let revision = meta
        .get_field(META_REVISION)
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    meta.insert(META_REVISION, revision + 1);
    meta.insert(META_UPDATED, now);
    meta
}

fn duplicate_key(field: &str, key: &ValueKey) -> LokiError {
    log::error!("Duplicate key {} for unique index on '{}'", key, field);
    LokiError::new(
        &format!("Duplicate key for unique index on '{}': {}", field, key),
        ErrorKind::DuplicateKey,
    )
}

#[cfg(test)]
mod tests {
    use crate::collection::{CollectionEventListener, CollectionEvents, CollectionOptions};
    use crate::common::{EventAware, Value};
    use crate::doc;
    use crate::errors::ErrorKind;
    use crate::query::field;
    use crate::Collection;
    use std::sync::{Arc, Mutex};

    fn users() -> Collection {
        let mut users = Collection::new(
            "users",
            CollectionOptions::new().unique("username").index("age"),
        );
        users
            .insert(vec![
                doc! { username: "joe", age: 39 },
                doc! { username: "jack", age: 20 },
                doc! { username: "jim", age: 30 },
                doc! { username: "dave", age: 25 },
            ])
            .unwrap();
        users
    }

    #[test]
    fn test_insert_assigns_ids_and_meta() {
        let users = users();
        assert_eq!(users.count(), 4);
        assert_eq!(users.max_id(), 4);
        let jim = users.get(3).unwrap();
        assert_eq!(jim.revision(), Some(0));
        assert!(jim.meta().unwrap().contains_key("created"));
    }

    #[test]
    fn test_insert_rejects_document_with_id() {
        let mut users = users();
        let joe = users.get(1).unwrap().clone();
        let err = users.insert_one(joe).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidDocument);
    }

    #[test]
    fn test_insert_batch_with_duplicate_is_rejected_whole() {
        let mut users = users();
        let err = users
            .insert(vec![doc! { username: "sue" }, doc! { username: "sue" }])
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DuplicateKey);
        assert_eq!(users.count(), 4);
        assert_eq!(users.max_id(), 4);
        assert_eq!(users.binary_index_values("age").unwrap().len(), 4);
    }

    #[test]
    fn test_update_bumps_revision_and_moves_index_entry() {
        let mut users = users();
        let mut jack = users.get(2).unwrap().clone();
        jack.put("age", 50);
        let jack = users.update(jack).unwrap();
        assert_eq!(jack.revision(), Some(1));
        assert!(jack.meta().unwrap().contains_key("updated"));
        assert_eq!(users.binary_index_values("age"), Some(&[3usize, 2, 0, 1][..]));
    }

    #[test]
    fn test_update_unknown_document_fails() {
        let mut users = users();
        let err = users.update(doc! { username: "nobody" }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnsyncedDocument);
        let mut ghost = users.get(1).unwrap().clone();
        users.remove(1).unwrap();
        ghost.put("age", 1);
        assert_eq!(users.update(ghost).unwrap_err().kind(), &ErrorKind::UnsyncedDocument);
    }

    #[test]
    fn test_update_swapping_unique_keys_in_one_batch() {
        let mut users = users();
        let mut joe = users.get(1).unwrap().clone();
        let mut jack = users.get(2).unwrap().clone();
        joe.put("username", "jack");
        jack.put("username", "joe");
        users.update_many(vec![joe, jack]).unwrap();
        assert_eq!(users.by("username", "jack").unwrap().unwrap().id(), Some(1));
        assert_eq!(users.by("username", "joe").unwrap().unwrap().id(), Some(2));
    }

    #[test]
    fn test_update_to_colliding_key_leaves_both_unchanged() {
        let mut users = users();
        let mut joe = users.get(1).unwrap().clone();
        joe.put("username", "jack");
        assert_eq!(users.update(joe).unwrap_err().kind(), &ErrorKind::DuplicateKey);
        assert_eq!(users.by("username", "joe").unwrap().unwrap().id(), Some(1));
        assert_eq!(users.by("username", "jack").unwrap().unwrap().id(), Some(2));
        assert_eq!(users.get(1).unwrap().revision(), Some(0));
    }

    #[test]
    fn test_remove_renumbers_positions() {
        let mut users = users();
        let removed = users.remove(2).unwrap();
        assert_eq!(removed.get("username"), Some(&Value::from("jack")));
        assert_eq!(users.id_index(), &[1, 3, 4]);
        assert_eq!(users.binary_index_values("age"), Some(&[2usize, 1, 0][..]));
        assert!(users.by("username", "jack").unwrap().is_none());
        assert!(users.remove(2).is_err());
    }

    #[test]
    fn test_batch_remove_matches_rebuild() {
        let mut users = users();
        users.remove_many(&[1, 3]).unwrap();
        let adaptive = users.binary_index_values("age").unwrap().to_vec();
        users.ensure_index("age", true);
        assert_eq!(users.binary_index_values("age").unwrap(), adaptive.as_slice());
        assert_eq!(users.id_index(), &[2, 4]);
    }

    #[test]
    fn test_clear_keeps_id_counter() {
        let mut users = users();
        users.clear();
        assert!(users.is_empty());
        let sue = users.insert_one(doc! { username: "sue", age: 1 }).unwrap();
        assert_eq!(sue.id(), Some(5));
        assert_eq!(users.binary_index_values("age"), Some(&[0usize][..]));
    }

    #[test]
    fn test_find_and_update_and_remove() {
        let mut users = users();
        let updated = users
            .find_and_update(field("age").gte(30), |doc| doc.put("senior", true))
            .unwrap();
        assert_eq!(updated.len(), 2);
        let removed = users.find_and_remove(doc! { senior: true }).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(users.count(), 2);
        assert_eq!(users.remove_where(|doc| doc.get("age").is_some()).len(), 2);
    }

    #[test]
    fn test_non_adaptive_write_marks_index_dirty() {
        let mut users = Collection::new(
            "users",
            CollectionOptions::new().index("age").adaptive_binary_indices(false),
        );
        users.insert_one(doc! { age: 3 }).unwrap();
        assert!(users.binary_index("age").unwrap().is_dirty());
        users.ensure_index("age", false);
        assert!(!users.binary_index("age").unwrap().is_dirty());
    }

    #[test]
    fn test_events_are_published() {
        let users_events = Arc::new(Mutex::new(Vec::new()));
        let sink = users_events.clone();
        let mut users = users();
        users
            .subscribe(CollectionEventListener::new(move |event| {
                if let Ok(mut events) = sink.lock() {
                    events.push((event.event_type(), event.documents().len()));
                }
                Ok(())
            }))
            .unwrap();

        users.insert_one(doc! { username: "sue" }).unwrap();
        let _ = users.insert_one(doc! { username: "sue" });
        users.remove(1).unwrap();

        let events = users_events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (CollectionEvents::PreInsert, 1),
                (CollectionEvents::Insert, 1),
                (CollectionEvents::PreInsert, 1),
                (CollectionEvents::Error, 0),
                (CollectionEvents::Delete, 1),
            ]
        );
    }
}
