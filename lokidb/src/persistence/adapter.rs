use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use crate::errors::LokiResult;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage backend for serialized database snapshots.
///
/// # Purpose
/// The database hands an adapter complete snapshots keyed by database
/// name. Adapters do not interpret the bytes; they only have to give back
/// what was last saved under a name.
///
/// # Contract
/// - `load` returns `Ok(None)` when nothing was saved under `name`
/// - `save` replaces any previous snapshot under `name`
/// - `delete` of a missing name succeeds
///
/// Failures are reported as `ErrorKind::PersistenceError`. Retrying is up
/// to the adapter.
pub trait PersistenceAdapter: Send + Sync {
    /// Reads the snapshot saved under `name`.
    ///
    /// # Arguments
    /// * `name` - The database name
    ///
    /// # Returns
    /// * `Ok(Some(bytes))` with the last saved snapshot
    /// * `Ok(None)` if no snapshot exists
    /// * `Err(LokiError)` if the backend failed
    fn load(&self, name: &str) -> LokiResult<Option<Vec<u8>>>;

    /// Stores `snapshot` under `name`.
    fn save(&self, name: &str, snapshot: &[u8]) -> LokiResult<()>;

    /// Drops the snapshot saved under `name`.
    fn delete(&self, name: &str) -> LokiResult<()>;
}

/// Adapter keeping snapshots in process memory.
///
/// Clones share the same storage, so a clone handed to one database can
/// be inspected or handed to another.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    inner: Arc<MemoryAdapterInner>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names with a saved snapshot.
    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.store.read_with(|store| store.contains_key(name))
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn load(&self, name: &str) -> LokiResult<Option<Vec<u8>>> {
        Ok(self.inner.store.read_with(|store| store.get(name).cloned()))
    }

    fn save(&self, name: &str, snapshot: &[u8]) -> LokiResult<()> {
        log::debug!("Saving {} bytes for '{}' in memory", snapshot.len(), name);
        self.inner
            .store
            .write_with(|store| store.insert(name.to_string(), snapshot.to_vec()));
        Ok(())
    }

    fn delete(&self, name: &str) -> LokiResult<()> {
        self.inner.store.write_with(|store| store.remove(name));
        Ok(())
    }
}

struct MemoryAdapterInner {
    store: Atomic<HashMap<String, Vec<u8>>>,
}

impl Default for MemoryAdapterInner {
    fn default() -> Self {
        MemoryAdapterInner {
            store: atomic(HashMap::new()),
        }
    }
}

impl MemoryAdapterInner {
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.read_with(|store| store.keys().cloned().collect());
        names.sort();
        names
    }
}
