//! In-memory storage for buffer-backed tapes and tests.

use super::ByteStorage;
use crate::error::{Error, Result};

/// A store that keeps every byte in a `Vec<u8>`.
///
/// # Example
///
/// ```rust
/// use recordtape::storage::{ByteStorage, MemoryStorage};
///
/// let mut storage = MemoryStorage::new();
/// let offset = storage.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(storage.len(), 9);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Vec<u8>,
    closed: bool,
}

impl MemoryStorage {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of all written bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_state("memory storage is closed"));
        }
        Ok(())
    }
}

impl ByteStorage for MemoryStorage {
    fn append(&mut self, data: &[u8]) -> Result<u64> {
        self.check_open()?;
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_open()?;
        let size = self.data.len() as u64;
        let end = offset.saturating_add(buf.len() as u64);
        if end > size {
            return Err(Error::OutOfRange { position: offset, length: buf.len(), size });
        }
        buf.copy_from_slice(&self.data[offset as usize..end as usize]);
        Ok(())
    }

    fn flush(&mut self, _force: bool) -> Result<()> {
        self.check_open()
    }

    fn truncate(&mut self) -> Result<()> {
        self.check_open()?;
        self.data.clear();
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.data = Vec::new();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory({} bytes)", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_read() {
        let mut storage = MemoryStorage::new();
        storage.append(b"hello").unwrap();
        storage.append(b" world").unwrap();

        let mut buf = [0u8; 5];
        storage.read_at(6, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
        assert_eq!(storage.data(), b"hello world");
    }

    #[test]
    fn test_read_past_end() {
        let mut storage = MemoryStorage::new();
        storage.append(b"abc").unwrap();
        let mut buf = [0u8; 2];
        assert!(matches!(storage.read_at(2, &mut buf), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_closed_storage_rejects_io() {
        let mut storage = MemoryStorage::new();
        storage.close().unwrap();
        assert!(storage.append(b"x").is_err());
        assert!(storage.close().is_ok());
    }
}
