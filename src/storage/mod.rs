//! Backing stores for tapes and spilled buffers.
//!
//! Backends are **opaque byte stores**: they append, read at an offset, flush
//! and truncate. Framing and chunk boundaries are interpreted by the tape and
//! buffer layers, never by a backend.
//!
//! # Invariants
//!
//! - `append` returns the offset where data was written
//! - `read_at` returns exactly the bytes previously written at that offset
//! - `flush(true)` returns only once appended data is durable
//! - A backend is exclusively owned by one tape or buffer

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::config::Options;
use crate::error::Result;
use std::fmt;

/// A low-level byte store owned by a single tape or buffer.
pub trait ByteStorage: Send + fmt::Debug {
    /// Appends data to the end of the store, returning its offset.
    fn append(&mut self, data: &[u8]) -> Result<u64>;

    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// Fails with [`crate::Error::OutOfRange`] if the read would extend past
    /// the end of the store.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Pushes buffered writes down; `force` also syncs them to disk.
    fn flush(&mut self, force: bool) -> Result<()>;

    /// Discards all data.
    fn truncate(&mut self) -> Result<()>;

    /// Number of bytes written so far.
    fn len(&self) -> u64;

    /// Returns true if nothing has been written.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases the backing resource. Later calls are no-ops.
    fn close(&mut self) -> Result<()>;

    /// Short description for log messages.
    fn describe(&self) -> String;
}

/// Creates the backing store for a tape with a given id.
pub trait StorageProvider: Send + Sync + fmt::Debug {
    /// Opens a fresh, exclusively owned store for tape `id`.
    fn create(&self, id: usize) -> Result<Box<dyn ByteStorage>>;
}

/// Provides temp-file stores spread over the configured temp directories.
#[derive(Debug, Clone)]
pub struct TempDirProvider {
    options: Options,
}

impl TempDirProvider {
    /// Creates a provider using `options.tmp_dirs` and `options.io_buffer_size`.
    pub fn new(options: Options) -> Self {
        Self { options }
    }
}

impl StorageProvider for TempDirProvider {
    fn create(&self, id: usize) -> Result<Box<dyn ByteStorage>> {
        let dir = self.options.tmp_dir_for(id);
        let storage =
            FileStorage::create_in(&dir, &format!("tape{:03}-", id), self.options.io_buffer_size)?;
        Ok(Box::new(storage))
    }
}

/// Provides in-memory stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryProvider;

impl StorageProvider for MemoryProvider {
    fn create(&self, _id: usize) -> Result<Box<dyn ByteStorage>> {
        Ok(Box::new(MemoryStorage::new()))
    }
}
