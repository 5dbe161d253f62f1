use crate::collection::{Collection, CollectionOptions, Document};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::index::DirtyReason;
use crate::resultset::{SimpleSortOptions, SortCriterion};
use crate::view::{DynamicView, DynamicViewOptions};
use serde::{Deserialize, Serialize};

/// Serialized form of a whole database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSnapshot {
    #[serde(default)]
    pub name: String,
    pub collections: Vec<CollectionSnapshot>,
}

/// Serialized form of a collection.
///
/// Binary index contents are not stored; only the indexed field names.
/// Unique indices are rebuilt from `data` on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    pub name: String,
    pub data: Vec<Document>,
    pub id_index: Vec<i64>,
    #[serde(default)]
    pub binary_index_names: Vec<String>,
    #[serde(default)]
    pub unique_names: Vec<String>,
    pub max_id: i64,
    #[serde(default = "adaptive_by_default")]
    pub adaptive_binary_indices: bool,
    #[serde(default)]
    pub disable_meta: bool,
    #[serde(default)]
    pub dynamic_views: Vec<DynamicViewSnapshot>,
}

fn adaptive_by_default() -> bool {
    true
}

/// Serialized form of a dynamic view: its find filters and its field
/// sort, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicViewSnapshot {
    pub name: String,
    #[serde(flatten)]
    pub options: DynamicViewOptions,
    #[serde(default)]
    pub filter_pipeline: Vec<FilterSnapshot>,
    #[serde(default)]
    pub sort: Option<SortSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub uid: String,
    pub query: Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SortSnapshot {
    Simple {
        field: String,
        options: SimpleSortOptions,
    },
    Compound {
        criteria: Vec<SortCriterion>,
    },
}

impl Collection {
    pub fn to_snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            name: self.name.clone(),
            data: self.data.clone(),
            id_index: self.id_index.clone(),
            binary_index_names: self.binary_index_names(),
            unique_names: self.unique_index_names(),
            max_id: self.max_id,
            adaptive_binary_indices: self.options.is_adaptive(),
            disable_meta: self.options.is_meta_disabled(),
            dynamic_views: self.dynamic_views.iter().map(DynamicView::to_snapshot).collect(),
        }
    }

    /// Restores a collection. Binary indices come back dirty and must be
    /// rebuilt with [Collection::ensure_all_indexes] before they answer
    /// queries; until then reads scan. Unique indices are rebuilt and
    /// dynamic views rematerialized.
    pub fn from_snapshot(snapshot: CollectionSnapshot) -> LokiResult<Collection> {
        let mut options = CollectionOptions::new()
            .adaptive_binary_indices(snapshot.adaptive_binary_indices)
            .disable_meta(snapshot.disable_meta);
        for field in &snapshot.binary_index_names {
            options = options.index(field);
        }
        for field in &snapshot.unique_names {
            options = options.unique(field);
        }

        let mut collection = Collection::new(&snapshot.name, options);
        collection.data = snapshot.data;
        collection.id_index = snapshot.id_index;
        collection.restore_id_index()?;
        collection.max_id = snapshot
            .max_id
            .max(collection.id_index.last().copied().unwrap_or(0));

        for index in collection.binary_indices.values_mut() {
            index.mark_dirty(DirtyReason::Loaded);
        }
        for unique in collection.unique_indices.values_mut() {
            unique.rebuild(&collection.data)?;
        }

        let mut views = Vec::with_capacity(snapshot.dynamic_views.len());
        for view in &snapshot.dynamic_views {
            views.push(DynamicView::from_snapshot(view, &collection)?);
        }
        collection.dynamic_views = views;

        log::debug!(
            "Restored collection '{}' with {} documents",
            collection.name,
            collection.data.len()
        );
        Ok(collection)
    }

    /// Makes `id_index` agree with the ids in `data`, which must all be
    /// present.
    fn restore_id_index(&mut self) -> LokiResult<()> {
        let mut ids = Vec::with_capacity(self.data.len());
        for doc in &self.data {
            match doc.id() {
                Some(id) => ids.push(id),
                None => {
                    log::error!("Snapshot of '{}' holds a document without id", self.name);
                    return Err(LokiError::new(
                        &format!("Snapshot of collection '{}' holds a document without id", self.name),
                        ErrorKind::EncodingError,
                    ));
                }
            }
        }

        if !ids.windows(2).all(|w| w[0] < w[1]) {
            log::warn!("Snapshot of '{}' is not in id order, reordering", self.name);
            self.data.sort_by_key(|doc| doc.id());
            ids.sort_unstable();
            if ids.windows(2).any(|w| w[0] == w[1]) {
                log::error!("Snapshot of '{}' holds duplicate ids", self.name);
                return Err(LokiError::new(
                    &format!("Snapshot of collection '{}' holds duplicate ids", self.name),
                    ErrorKind::EncodingError,
                ));
            }
        }

        if ids != self.id_index {
            log::warn!("Id index of '{}' does not match its data, rebuilt", self.name);
            self.id_index = ids;
        }
        Ok(())
    }
}
