//! Memory-mapped file backend.

use super::{checked_slice, Backend};
use crate::{
    Error::{Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path, time::SystemTime};

/// A backend over a read-only memory mapping of a file on disk.
///
/// The file is mapped once; the last-modified time is captured at the same moment so the
/// store pool can detect a file that changed after it was opened.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
    modified: Option<SystemTime>,
}

impl Physical {
    /// Maps the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, or a generic error if
    /// the mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        let modified = file.metadata().and_then(|meta| meta.modified()).ok();

        // The mapping is read-only; writers replacing the file are detected through `modified`.
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical {
            data: mmap,
            modified,
        })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        checked_slice(&self.data, offset, len)
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

/// Reads the last-modified time of `path` without mapping it.
pub(crate) fn modified_time(path: &Path) -> Result<Option<SystemTime>> {
    let meta = fs::metadata(path)?;
    Ok(meta.modified().ok())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn physical() {
        let temp_path = std::env::temp_dir().join("dotbind_physical_test.bin");
        std::fs::write(&temp_path, [0x4D, 0x5A, 0x90, 0x00, 0x03]).unwrap();

        let physical = Physical::new(&temp_path).unwrap();
        assert_eq!(physical.len(), 5);
        assert_eq!(physical.data()[0], 0x4D);
        assert_eq!(physical.data_slice(1, 2).unwrap(), &[0x5A, 0x90]);
        assert!(physical.data_slice(4, 2).is_err());
        assert!(physical.modified().is_some());

        assert_eq!(
            modified_time(&temp_path).unwrap(),
            physical.modified()
        );

        drop(physical);
        std::fs::remove_file(&temp_path).ok();
    }

    #[test]
    fn test_physical_invalid_file_path() {
        let result = Physical::new(PathBuf::from("/nonexistent/path/to/file.winmd"));
        match result {
            Err(FileError(io_error)) => {
                assert_eq!(io_error.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected FileError, got {other:?}"),
        }
    }

    #[test]
    fn test_physical_empty_file() {
        let temp_path = std::env::temp_dir().join("dotbind_empty_test_file.bin");
        std::fs::write(&temp_path, b"").unwrap();

        // Mapping an empty file is rejected on some platforms.
        if let Ok(physical) = Physical::new(&temp_path) {
            assert!(physical.is_empty());
            assert!(physical.data_slice(0, 1).is_err());
        }

        std::fs::remove_file(&temp_path).ok();
    }
}
