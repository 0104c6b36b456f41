//! Raw data sources for metadata stores.
//!
//! A metadata store is backed by bytes that are mapped once when the store is opened and
//! shared by every reader rented from it afterwards. The [`Backend`] trait abstracts over where
//! those bytes come from.
//!
//! # Backend Implementations
//! - [`crate::file::physical::Physical`] - Memory-mapped file backend for disk access
//! - [`crate::file::memory::Memory`] - In-memory buffer backend, used for generated or embedded metadata
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotbind::file::{physical::Physical, Backend};
//!
//! let backend = Physical::new("Windows.Win32.winmd")?;
//! println!("{} bytes mapped", backend.len());
//! # Ok::<(), dotbind::Error>(())
//! ```

pub mod memory;
pub mod physical;

use std::time::SystemTime;

use crate::Result;

/// Backend for the raw bytes of a metadata store.
///
/// Implementations must be shareable across threads since every reader rented from a store
/// reads from the same backend concurrently.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the backend holds no data.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last-modified time of the underlying source, if it has one.
    ///
    /// Stores opened from the same path are reused only while this value is unchanged.
    fn modified(&self) -> Option<SystemTime> {
        None
    }
}

pub(crate) fn checked_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let Some(offset_end) = offset.checked_add(len) else {
        return Err(malformed_error!(
            "Read of {} bytes at offset {} overflows",
            len,
            offset
        ));
    };

    if offset_end > data.len() {
        return Err(malformed_error!(
            "Read of {} bytes at offset {} exceeds the {} available bytes",
            len,
            offset,
            data.len()
        ));
    }

    Ok(&data[offset..offset_end])
}
