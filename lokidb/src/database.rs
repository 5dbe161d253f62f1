use crate::collection::{Collection, CollectionOptions};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::persistence::{DatabaseSnapshot, PersistenceAdapter};
use indexmap::IndexMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Name and size of a collection, as listed by [Database::list_collections].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
}

/// A named set of collections with optional persistence.
///
/// The database serializes to a JSON snapshot and hands it to its
/// [PersistenceAdapter] on [Database::save_database]. Without an adapter the
/// database still serializes and loads JSON directly.
///
/// ```rust
/// use lokidb::{doc, Database, CollectionOptions, MemoryAdapter};
///
/// let adapter = MemoryAdapter::new();
/// let mut db = Database::builder()
///     .name("armory")
///     .adapter(adapter.clone())
///     .open()
///     .unwrap();
/// let weapons = db.add_collection("weapons", CollectionOptions::new().unique("name")).unwrap();
/// weapons.insert_one(doc! { name: "mjolnir" }).unwrap();
/// db.save_database().unwrap();
/// assert!(adapter.contains("armory"));
/// ```
pub struct Database {
    name: String,
    collections: IndexMap<String, Collection>,
    adapter: Option<Arc<dyn PersistenceAdapter>>,
    pretty: bool,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// An in-memory database without adapter.
    pub fn new(name: &str) -> Self {
        Database {
            name: name.to_string(),
            collections: IndexMap::new(),
            adapter: None,
            pretty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_adapter(&self) -> bool {
        self.adapter.is_some()
    }

    /// Creates a collection. Fails if the name is taken.
    pub fn add_collection(&mut self, name: &str, options: CollectionOptions) -> LokiResult<&mut Collection> {
        if self.collections.contains_key(name) {
            log::error!("Collection '{}' already exists in '{}'", name, self.name);
            return Err(LokiError::new(
                &format!("Collection '{}' already exists", name),
                ErrorKind::CollectionAlreadyExists,
            ));
        }
        log::debug!("Adding collection '{}' to '{}'", name, self.name);
        let collection = self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(name, options));
        Ok(collection)
    }

    pub fn get_collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn get_collection_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.collections.get_mut(name)
    }

    /// Like [Database::get_collection_mut], failing with
    /// `CollectionNotFound`.
    pub fn collection_mut(&mut self, name: &str) -> LokiResult<&mut Collection> {
        if !self.collections.contains_key(name) {
            log::error!("Collection '{}' not found in '{}'", name, self.name);
            return Err(LokiError::new(
                &format!("Collection '{}' not found", name),
                ErrorKind::CollectionNotFound,
            ));
        }
        self.collections.get_mut(name).ok_or_else(|| {
            LokiError::new(&format!("Collection '{}' not found", name), ErrorKind::CollectionNotFound)
        })
    }

    pub fn remove_collection(&mut self, name: &str) -> bool {
        match self.collections.shift_remove(name) {
            Some(collection) => {
                if let Err(err) = collection.event_bus.close() {
                    log::warn!("Failed to close event bus of '{}': {}", name, err);
                }
                true
            }
            None => false,
        }
    }

    pub fn rename_collection(&mut self, old_name: &str, new_name: &str) -> LokiResult<()> {
        if self.collections.contains_key(new_name) {
            log::error!("Collection '{}' already exists in '{}'", new_name, self.name);
            return Err(LokiError::new(
                &format!("Collection '{}' already exists", new_name),
                ErrorKind::CollectionAlreadyExists,
            ));
        }
        let Some(mut collection) = self.collections.shift_remove(old_name) else {
            log::error!("Collection '{}' not found in '{}'", old_name, self.name);
            return Err(LokiError::new(
                &format!("Collection '{}' not found", old_name),
                ErrorKind::CollectionNotFound,
            ));
        };
        collection.name = new_name.to_string();
        self.collections.insert(new_name.to_string(), collection);
        Ok(())
    }

    pub fn list_collections(&self) -> Vec<CollectionInfo> {
        self.collections
            .values()
            .map(|c| CollectionInfo {
                name: c.name().to_string(),
                count: c.count(),
            })
            .collect()
    }

    pub fn to_snapshot(&self) -> DatabaseSnapshot {
        DatabaseSnapshot {
            name: self.name.clone(),
            collections: self.collections.values().map(Collection::to_snapshot).collect(),
        }
    }

    /// The database as a JSON snapshot.
    pub fn serialize(&self) -> LokiResult<String> {
        let snapshot = self.to_snapshot();
        let json = if self.pretty {
            serde_json::to_string_pretty(&snapshot)?
        } else {
            serde_json::to_string(&snapshot)?
        };
        Ok(json)
    }

    /// Replaces every collection with the ones in a JSON snapshot. On
    /// failure the current collections are kept.
    pub fn load_json(&mut self, json: &str) -> LokiResult<()> {
        let snapshot: DatabaseSnapshot = serde_json::from_str(json)?;
        self.load_snapshot(snapshot)
    }

    pub fn load_snapshot(&mut self, snapshot: DatabaseSnapshot) -> LokiResult<()> {
        let mut collections = IndexMap::with_capacity(snapshot.collections.len());
        for collection in snapshot.collections {
            let collection = Collection::from_snapshot(collection)?;
            collections.insert(collection.name().to_string(), collection);
        }
        for (name, collection) in &self.collections {
            if let Err(err) = collection.event_bus.close() {
                log::warn!("Failed to close event bus of '{}': {}", name, err);
            }
        }
        self.collections = collections;
        log::debug!("Loaded {} collections into '{}'", self.collections.len(), self.name);
        Ok(())
    }

    fn require_adapter(&self) -> LokiResult<&Arc<dyn PersistenceAdapter>> {
        self.adapter.as_ref().ok_or_else(|| {
            log::error!("No persistence adapter configured for '{}'", self.name);
            LokiError::new(
                &format!("No persistence adapter configured for database '{}'", self.name),
                ErrorKind::AdapterNotConfigured,
            )
        })
    }

    /// Serializes the database and hands it to the adapter.
    pub fn save_database(&self) -> LokiResult<()> {
        let adapter = self.require_adapter()?;
        let json = self.serialize()?;
        adapter.save(&self.name, json.as_bytes()).map_err(|e| {
            log::error!("Failed to save database '{}': {}", self.name, e);
            LokiError::new_with_cause(
                &format!("Failed to save database '{}'", self.name),
                ErrorKind::PersistenceError,
                e,
            )
        })
    }

    /// Loads the snapshot the adapter holds for this database. Returns
    /// false, leaving the database as it is, when there is none.
    pub fn load_database(&mut self) -> LokiResult<bool> {
        let adapter = self.require_adapter()?.clone();
        let bytes = adapter.load(&self.name).map_err(|e| {
            log::error!("Failed to load database '{}': {}", self.name, e);
            LokiError::new_with_cause(
                &format!("Failed to load database '{}'", self.name),
                ErrorKind::PersistenceError,
                e,
            )
        })?;
        let Some(bytes) = bytes else {
            log::debug!("No saved snapshot for '{}'", self.name);
            return Ok(false);
        };
        let json = String::from_utf8(bytes)?;
        self.load_json(&json)?;
        Ok(true)
    }

    /// Drops the adapter's snapshot. The in-memory collections stay.
    pub fn delete_database(&self) -> LokiResult<()> {
        let adapter = self.require_adapter()?;
        adapter.delete(&self.name).map_err(|e| {
            log::error!("Failed to delete database '{}': {}", self.name, e);
            LokiError::new_with_cause(
                &format!("Failed to delete database '{}'", self.name),
                ErrorKind::PersistenceError,
                e,
            )
        })
    }
}

impl Debug for Database {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .field("has_adapter", &self.adapter.is_some())
            .finish()
    }
}

/// Builder for a [Database].
///
/// Configuration errors are captured and returned from
/// [DatabaseBuilder::open].
#[derive(Default)]
pub struct DatabaseBuilder {
    error: Option<LokiError>,
    name: Option<String>,
    adapter: Option<Arc<dyn PersistenceAdapter>>,
    pretty: bool,
    autoload: bool,
    collections: Vec<(String, CollectionOptions)>,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database name, also the key under which the adapter stores it.
    pub fn name(mut self, name: &str) -> Self {
        if self.error.is_none() {
            if name.trim().is_empty() {
                log::error!("Database name cannot be empty");
                self.error = Some(LokiError::new(
                    "Database name cannot be empty",
                    ErrorKind::InvalidDocument,
                ));
            } else {
                self.name = Some(name.to_string());
            }
        }
        self
    }

    pub fn adapter<A: PersistenceAdapter + 'static>(mut self, adapter: A) -> Self {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Pretty-print serialized snapshots.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Load the adapter's snapshot when opening.
    pub fn autoload(mut self, autoload: bool) -> Self {
        self.autoload = autoload;
        self
    }

    /// Declares a collection to create on open if a loaded snapshot does
    /// not already provide it.
    pub fn collection(mut self, name: &str, options: CollectionOptions) -> Self {
        self.collections.push((name.to_string(), options));
        self
    }

    pub fn open(self) -> LokiResult<Database> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut db = Database {
            name: self.name.unwrap_or_else(|| "loki.db".to_string()),
            collections: IndexMap::new(),
            adapter: self.adapter,
            pretty: self.pretty,
        };
        if self.autoload {
            db.load_database()?;
        }
        for (name, options) in self.collections {
            if db.get_collection(&name).is_none() {
                db.add_collection(&name, options)?;
            }
        }
        Ok(db)
    }
}
