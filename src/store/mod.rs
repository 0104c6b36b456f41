//! Pooled access to metadata stores.
//!
//! A [`MetadataStore`] owns the mapped bytes of one metadata file and a free list of readers
//! over them. Readers are not thread-safe, so every consumer rents its own through
//! [`MetadataStore::rent`]; the returned [`ReaderRental`] hands the reader back when dropped.
//!
//! Stores are cached per path by a session-scoped [`StorePool`]. When the file on disk changes,
//! the pool disposes the stale store: readers still rented out keep working, and the mapping is
//! released once the last of them comes back.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotbind::{metadata::memory::MetadataBuilder, store::StorePool};
//!
//! let pool = StorePool::new();
//! let factory = MetadataBuilder::new("Windows.Win32").build().factory();
//! let store = pool.open("Windows.Win32.winmd", factory)?;
//! let reader = store.rent()?;
//! println!("{}", reader.assembly_name());
//! # Ok::<(), dotbind::Error>(())
//! ```

mod pool;
mod rental;

pub use pool::StorePool;
pub use rental::ReaderRental;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::SystemTime,
};

use tracing::{debug, trace};

use crate::{
    file::{physical::Physical, Backend},
    index::{MetadataIndex, Platform},
    metadata::reader::{MetadataReader, ReaderFactory},
    Error, Result,
};

struct StoreState {
    backend: Option<Arc<dyn Backend>>,
    free: Vec<Box<dyn MetadataReader>>,
    rented: usize,
    disposed: bool,
}

/// One metadata file, mapped once and shared by all readers rented from it.
pub struct MetadataStore {
    path: PathBuf,
    modified: Option<SystemTime>,
    factory: Arc<dyn ReaderFactory>,
    state: Mutex<StoreState>,
    indexes: Mutex<HashMap<Platform, Arc<MetadataIndex>>>,
}

impl MetadataStore {
    /// Maps the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<Path>, factory: Arc<dyn ReaderFactory>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let backend = Physical::new(path)?;
        debug!(path = %path.display(), bytes = backend.len(), "Mapped metadata store");
        Ok(Self::from_backend(path, Arc::new(backend), factory))
    }

    /// Creates a store over an already loaded backend.
    ///
    /// `path` only identifies the store; nothing is read from it.
    pub fn from_backend(
        path: impl AsRef<Path>,
        backend: Arc<dyn Backend>,
        factory: Arc<dyn ReaderFactory>,
    ) -> Arc<Self> {
        Arc::new(MetadataStore {
            path: path.as_ref().to_path_buf(),
            modified: backend.modified(),
            factory,
            state: Mutex::new(StoreState {
                backend: Some(backend),
                free: Vec::new(),
                rented: 0,
                disposed: false,
            }),
            indexes: Mutex::new(HashMap::new()),
        })
    }

    /// The path this store was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last-modified time captured when the store was opened.
    #[must_use]
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Rents a reader, reusing a returned one when available.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Usage`] if the store has been disposed, or the factory's error
    /// if a new reader cannot be created.
    pub fn rent(self: &Arc<Self>) -> Result<ReaderRental> {
        let mut state = lock!(self.state);
        if state.disposed {
            return Err(Error::Usage(format!(
                "The metadata store {} was disposed and can no longer be used",
                self.path.display()
            )));
        }

        let reader = match state.free.pop() {
            Some(reader) => reader,
            None => {
                let Some(backend) = state.backend.clone() else {
                    return Err(Error::Usage(format!(
                        "The metadata store {} has no backing data",
                        self.path.display()
                    )));
                };
                self.factory.create(backend)?
            }
        };

        state.rented += 1;
        trace!(path = %self.path.display(), rented = state.rented, "Rented reader");
        Ok(ReaderRental::new(reader, Arc::clone(self)))
    }

    pub(crate) fn release(&self, reader: Box<dyn MetadataReader>) {
        let mut state = lock!(self.state);
        state.rented = state.rented.saturating_sub(1);

        if state.disposed {
            drop(reader);
            if state.rented == 0 && state.backend.take().is_some() {
                debug!(path = %self.path.display(), "Released stale metadata store");
            }
        } else {
            state.free.push(reader);
        }
    }

    /// Marks the store stale.
    ///
    /// Idle readers are dropped immediately; the mapping is released as soon as the last
    /// outstanding rental is returned. Further rentals fail.
    pub fn dispose(&self) {
        let mut state = lock!(self.state);
        state.disposed = true;
        state.free.clear();
        if state.rented == 0 {
            state.backend = None;
        }
        debug!(path = %self.path.display(), outstanding = state.rented, "Disposed metadata store");
    }

    /// Returns `true` once [`MetadataStore::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock!(self.state).disposed
    }

    /// Returns `true` while the mapped bytes are still held.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        lock!(self.state).backend.is_some()
    }

    /// Number of readers currently rented out.
    #[must_use]
    pub fn rented(&self) -> usize {
        lock!(self.state).rented
    }

    /// Number of idle readers on the free list.
    #[must_use]
    pub fn idle(&self) -> usize {
        lock!(self.state).free.len()
    }

    /// The index of this store for `platform`, built on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if no reader can be rented or the metadata cannot be walked.
    pub fn index(self: &Arc<Self>, platform: Platform) -> Result<Arc<MetadataIndex>> {
        let mut indexes = lock!(self.indexes);
        if let Some(index) = indexes.get(&platform) {
            return Ok(Arc::clone(index));
        }

        let reader = self.rent()?;
        let index = Arc::new(MetadataIndex::build(&*reader, platform)?);
        indexes.insert(platform, Arc::clone(&index));
        Ok(index)
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("path", &self.path)
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::memory::Memory, metadata::memory::MetadataBuilder};

    fn store() -> Arc<MetadataStore> {
        let mut builder = MetadataBuilder::new("Test");
        builder.struct_type("Test", "POINT");
        MetadataStore::from_backend(
            "test.winmd",
            Arc::new(Memory::new(vec![0; 16])),
            builder.build().factory(),
        )
    }

    #[test]
    fn rent_and_return_reuses_readers() {
        let store = store();
        {
            let first = store.rent().unwrap();
            let second = store.rent().unwrap();
            assert_eq!(first.assembly_name(), "Test");
            assert_eq!(second.type_definitions().len(), 1);
            assert_eq!(store.rented(), 2);
        }
        assert_eq!(store.rented(), 0);
        assert_eq!(store.idle(), 2);

        let _again = store.rent().unwrap();
        assert_eq!(store.idle(), 1);
    }

    #[test]
    fn dispose_waits_for_outstanding_rentals() {
        let store = store();
        let rental = store.rent().unwrap();

        store.dispose();
        assert!(store.is_disposed());
        assert!(store.is_mapped());
        assert_eq!(rental.assembly_name(), "Test");
        assert!(matches!(store.rent(), Err(Error::Usage(_))));

        drop(rental);
        assert!(!store.is_mapped());
        assert_eq!(store.idle(), 0);
    }

    #[test]
    fn dispose_without_rentals_releases_immediately() {
        let store = store();
        drop(store.rent().unwrap());
        store.dispose();
        assert!(!store.is_mapped());
        assert_eq!(store.idle(), 0);
    }

    #[test]
    fn index_is_built_once_per_platform() {
        let store = store();
        let first = store.index(Platform::X64).unwrap();
        let second = store.index(Platform::X64).unwrap();
        let other = store.index(Platform::Arm64).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(store.rented(), 0);
    }
}
