use crate::collection::Document;
use crate::common::{Value, ValueKey};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use std::collections::HashMap;

/// Exact-match index enforcing that no two documents share a field value.
///
/// Maps the field's key to the owning document id and back. Documents whose
/// field is missing or `null` are not indexed and never collide.
///
/// Every mutation either applies completely or fails with
/// [ErrorKind::DuplicateKey] and leaves the index untouched.
#[derive(Debug, Clone)]
pub struct UniqueIndex {
    field: String,
    key_map: HashMap<ValueKey, i64>,
    id_map: HashMap<i64, ValueKey>,
}

impl UniqueIndex {
    pub fn new(field: &str) -> Self {
        UniqueIndex {
            field: field.to_string(),
            key_map: HashMap::new(),
            id_map: HashMap::new(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.key_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_map.is_empty()
    }

    fn key_of(&self, doc: &Document) -> Option<ValueKey> {
        ValueKey::from_value(doc.resolve(&self.field))
    }

    fn duplicate(&self, key: &ValueKey) -> LokiError {
        log::error!("Duplicate key {} for unique index on '{}'", key, self.field);
        LokiError::new(
            &format!("Duplicate key for unique index on '{}': {}", self.field, key),
            ErrorKind::DuplicateKey,
        )
    }

    /// Fails if storing `doc` under `id` would collide with another document.
    pub fn check(&self, doc: &Document, id: Option<i64>) -> LokiResult<()> {
        if let Some(key) = self.key_of(doc) {
            if let Some(owner) = self.key_map.get(&key) {
                if Some(*owner) != id {
                    return Err(self.duplicate(&key));
                }
            }
        }
        Ok(())
    }

    /// Indexes a document that already carries its id.
    pub fn set(&mut self, doc: &Document) -> LokiResult<()> {
        let Some(id) = doc.id() else {
            log::error!("Cannot index a document without id on '{}'", self.field);
            return Err(LokiError::new(
                "Unique index requires a document with an id",
                ErrorKind::UnsyncedDocument,
            ));
        };
        self.check(doc, Some(id))?;
        if let Some(key) = self.key_of(doc) {
            self.key_map.insert(key.clone(), id);
            self.id_map.insert(id, key);
        }
        Ok(())
    }

    /// Re-keys a document whose field may have changed. The old mapping
    /// stays intact when the new key collides.
    pub fn update(&mut self, old: &Document, new: &Document) -> LokiResult<()> {
        let id = new.id().or_else(|| old.id());
        self.check(new, id)?;

        let Some(id) = id else {
            return Ok(());
        };
        if let Some(old_key) = self.id_map.remove(&id) {
            self.key_map.remove(&old_key);
        }
        if let Some(key) = self.key_of(new) {
            self.key_map.insert(key.clone(), id);
            self.id_map.insert(id, key);
        }
        Ok(())
    }

    /// Drops the mapping for `key`, returning the id it pointed at.
    pub fn remove(&mut self, key: &Value) -> Option<i64> {
        let key = ValueKey::from_value(key)?;
        let id = self.key_map.remove(&key)?;
        self.id_map.remove(&id);
        Some(id)
    }

    pub fn remove_by_id(&mut self, id: i64) -> Option<ValueKey> {
        let key = self.id_map.remove(&id)?;
        self.key_map.remove(&key);
        Some(key)
    }

    /// Id of the document holding `key`.
    pub fn get(&self, key: &Value) -> Option<i64> {
        ValueKey::from_value(key).and_then(|k| self.key_map.get(&k).copied())
    }

    pub fn by_id(&self, id: i64) -> Option<&ValueKey> {
        self.id_map.get(&id)
    }

    pub fn clear(&mut self) {
        self.key_map.clear();
        self.id_map.clear();
    }

    /// Re-indexes `data` from scratch. On a duplicate the index is left empty.
    pub fn rebuild(&mut self, data: &[Document]) -> LokiResult<()> {
        self.clear();
        for doc in data {
            if let Err(e) = self.set(doc) {
                self.clear();
                return Err(e);
            }
        }
        log::debug!("Rebuilt unique index on '{}' with {} keys", self.field, self.len());
        Ok(())
    }

    /// Verifies the maps agree with each other and with `data`.
    pub fn check_consistency(&self, data: &[Document]) -> bool {
        if self.key_map.len() != self.id_map.len() {
            return false;
        }
        let mut expected = 0;
        for doc in data {
            if let (Some(id), Some(key)) = (doc.id(), self.key_of(doc)) {
                expected += 1;
                if self.key_map.get(&key) != Some(&id) || self.id_map.get(&id) != Some(&key) {
                    return false;
                }
            }
        }
        expected == self.key_map.len()
    }
}
