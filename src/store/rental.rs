use std::{ops::Deref, sync::Arc};

use crate::{metadata::reader::MetadataReader, store::MetadataStore};

/// A reader rented from a [`MetadataStore`].
///
/// Dereferences to the reader. Dropping the rental returns the reader to its store.
pub struct ReaderRental {
    reader: Option<Box<dyn MetadataReader>>,
    store: Arc<MetadataStore>,
}

impl ReaderRental {
    pub(crate) fn new(reader: Box<dyn MetadataReader>, store: Arc<MetadataStore>) -> Self {
        ReaderRental {
            reader: Some(reader),
            store,
        }
    }

    /// The store this reader was rented from.
    #[must_use]
    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }
}

impl Deref for ReaderRental {
    type Target = dyn MetadataReader;

    fn deref(&self) -> &Self::Target {
        // Only taken in drop.
        match &self.reader {
            Some(reader) => reader.as_ref(),
            None => unreachable!("reader accessed after return"),
        }
    }
}

impl Drop for ReaderRental {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.store.release(reader);
        }
    }
}
