use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use tracing::debug;

use crate::{
    file::{physical::modified_time, Backend},
    metadata::reader::ReaderFactory,
    store::MetadataStore,
    Result,
};

/// A session-scoped registry of open metadata stores, keyed by path.
///
/// Opening the same path twice returns the same store as long as the file's last-modified time
/// is unchanged. A changed file evicts and disposes the old store before a fresh one is mapped.
#[derive(Default)]
pub struct StorePool {
    stores: Mutex<HashMap<PathBuf, Arc<MetadataStore>>>,
}

impl StorePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the store at `path`, reusing a cached one if the file has not changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be inspected or mapped.
    pub fn open(
        &self,
        path: impl AsRef<Path>,
        factory: Arc<dyn ReaderFactory>,
    ) -> Result<Arc<MetadataStore>> {
        let path = path.as_ref();
        let modified = modified_time(path)?;

        let mut stores = lock!(self.stores);
        if let Some(existing) = stores.get(path) {
            if existing.modified() == modified && !existing.is_disposed() {
                return Ok(Arc::clone(existing));
            }

            debug!(path = %path.display(), "Metadata store changed on disk, evicting");
            if let Some(stale) = stores.remove(path) {
                stale.dispose();
            }
        }

        let store = MetadataStore::open(path, factory)?;
        stores.insert(path.to_path_buf(), Arc::clone(&store));
        Ok(store)
    }

    /// Registers a store over an already loaded backend under `key`.
    ///
    /// A store previously registered under the same key is disposed.
    pub fn insert(
        &self,
        key: impl AsRef<Path>,
        backend: Arc<dyn Backend>,
        factory: Arc<dyn ReaderFactory>,
    ) -> Arc<MetadataStore> {
        let key = key.as_ref();
        let store = MetadataStore::from_backend(key, backend, factory);
        if let Some(previous) = lock!(self.stores).insert(key.to_path_buf(), Arc::clone(&store)) {
            previous.dispose();
        }
        store
    }

    /// Removes and disposes the store at `path`. Returns `true` if one was cached.
    pub fn evict(&self, path: impl AsRef<Path>) -> bool {
        match lock!(self.stores).remove(path.as_ref()) {
            Some(store) => {
                store.dispose();
                true
            }
            None => false,
        }
    }

    /// Disposes every cached store.
    pub fn clear(&self) {
        for (_, store) in lock!(self.stores).drain() {
            store.dispose();
        }
    }

    /// Number of cached stores.
    #[must_use]
    pub fn len(&self) -> usize {
        lock!(self.stores).len()
    }

    /// Returns `true` if no store is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for StorePool {
    fn drop(&mut self) {
        if let Ok(stores) = self.stores.get_mut() {
            for (_, store) in stores.drain() {
                store.dispose();
            }
        }
    }
}
