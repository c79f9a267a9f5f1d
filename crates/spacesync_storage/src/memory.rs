//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A journal backend that keeps every byte in memory.
///
/// Used by `VersionedStore::open_in_memory()` and by tests. Nothing
/// survives the process.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`, e.g. a journal image
    /// captured from another backend to test recovery.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"space").unwrap(), 0);
        assert_eq!(backend.append(b"sync").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 9);
    }

    #[test]
    fn read_at_and_past_end() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"cookie").unwrap();

        assert_eq!(backend.read_at(1, 3).unwrap(), b"ook");
        assert!(matches!(
            backend.read_at(4, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn read_from_offset() {
        let backend = InMemoryBackend::with_data(b"headtail".to_vec());
        assert_eq!(backend.read_from(4).unwrap(), b"tail");
        assert!(backend.read_from(8).unwrap().is_empty());
        assert!(backend.read_from(100).unwrap().is_empty());
    }

    #[test]
    fn truncate_drops_tail() {
        let mut backend = InMemoryBackend::with_data(b"goodtorn".to_vec());
        backend.truncate(4).unwrap();
        assert_eq!(backend.data(), b"good");

        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncatePastEnd { .. })
        ));
    }
}
