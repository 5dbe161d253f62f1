use crate::collection::{Collection, CollectionOptions, Document};
use crate::common::{Value, ValueKey};
use crate::errors::LokiResult;
use crate::resultset::Resultset;
use std::collections::HashMap;
use std::ops::Deref;

/// Name of the anonymous collection holding join output.
pub const JOIN_COLLECTION: &str = "joinData";

/// How a join side computes its key.
pub enum JoinKey<'a> {
    Field(&'a str),
    Computed(&'a dyn Fn(&Document) -> Value),
}

impl JoinKey<'_> {
    fn key_of(&self, doc: &Document) -> Option<ValueKey> {
        match self {
            JoinKey::Field(field) => ValueKey::from_value(doc.resolve(field)),
            JoinKey::Computed(key_fn) => ValueKey::from_value(&key_fn(doc)),
        }
    }
}

impl<'a> From<&'a str> for JoinKey<'a> {
    fn from(field: &'a str) -> Self {
        JoinKey::Field(field)
    }
}

impl<C: Deref<Target = Collection>> Resultset<C> {
    /// Hash join of this resultset against `right` on equal keys.
    ///
    /// Every left document yields one `{left, right}` document; `right` is
    /// empty when nothing matches, and when several right documents share a
    /// key the last one wins. The output lives in a new, meta-free
    /// collection.
    pub fn eq_join(
        &self,
        right: &[Document],
        left_key: JoinKey,
        right_key: JoinKey,
    ) -> LokiResult<Resultset<Box<Collection>>> {
        self.eq_join_map(right, left_key, right_key, |left, right| {
            let mut joined = Document::new();
            joined.insert("left", left.clone());
            joined.insert("right", right.clone());
            joined
        })
    }

    /// Like [Resultset::eq_join] with a custom output document. Reserved
    /// fields are stripped from what `map` returns.
    pub fn eq_join_map<F>(
        &self,
        right: &[Document],
        left_key: JoinKey,
        right_key: JoinKey,
        map: F,
    ) -> LokiResult<Resultset<Box<Collection>>>
    where
        F: Fn(&Document, &Document) -> Document,
    {
        let mut right_map: HashMap<ValueKey, &Document> = HashMap::with_capacity(right.len());
        for doc in right {
            if let Some(key) = right_key.key_of(doc) {
                right_map.insert(key, doc);
            }
        }

        let empty = Document::new();
        let joined: Vec<Document> = self
            .docs()
            .map(|left| {
                let matched = left_key
                    .key_of(left)
                    .and_then(|key| right_map.get(&key).copied())
                    .unwrap_or(&empty);
                map(left, matched).without_meta()
            })
            .collect();

        log::debug!("eq_join produced {} documents", joined.len());
        let mut collection = Collection::new(JOIN_COLLECTION, CollectionOptions::new().disable_meta(true));
        collection.insert(joined)?;
        Ok(Resultset::new(Box::new(collection)))
    }
}
