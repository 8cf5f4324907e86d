//! Configuration options for buffers, tapes and the external sorter.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default initial capacity of a dynamic record buffer (64KB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Default ceiling for one serialized record (12MB).
pub const DEFAULT_MAX_RECORD_SIZE: usize = 12 * 1024 * 1024;

/// Default capacity of tape read/write buffers (32KB).
pub const DEFAULT_IO_BUFFER_SIZE: usize = 32 * 1024;

/// Configuration shared by buffers, tapes and sorters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Directories tape and spill files are created in.
    /// Tape `id` uses `tmp_dirs[id % len]`; empty means the system temp dir.
    /// Default: empty
    pub tmp_dirs: Vec<PathBuf>,

    /// Initial capacity of a dynamic record buffer (in bytes).
    /// Default: 64KB
    pub buffer_capacity: usize,

    /// Maximum size of a single serialized record (in bytes).
    /// Default: 12MB
    pub max_record_size: usize,

    /// Spill a full dynamic buffer to a temp file instead of growing it.
    /// Default: false
    pub spill_to_disk: bool,

    /// Capacity of the buffered reader/writer used by file tapes.
    /// Default: 32KB
    pub io_buffer_size: usize,

    /// Number of records the external sorter holds before spilling a run.
    /// Default: 10000
    pub sort_buffer_records: usize,

    /// Number of tapes per carousel used by the external sorter.
    /// Default: 6
    pub num_tapes: usize,

    /// Verify chunk checksums while replaying tapes.
    /// Default: true
    pub verify_chunk_checksums: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tmp_dirs: Vec::new(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            spill_to_disk: false,
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            sort_buffer_records: 10_000,
            num_tapes: 6,
            verify_chunk_checksums: true,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a temporary directory for tapes and spill files.
    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dirs.push(dir.into());
        self
    }

    /// Sets the initial dynamic buffer capacity.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Sets the maximum serialized record size.
    pub fn max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size;
        self
    }

    /// Enables or disables spilling full buffers to disk.
    pub fn spill_to_disk(mut self, value: bool) -> Self {
        self.spill_to_disk = value;
        self
    }

    /// Sets the tape I/O buffer size.
    pub fn io_buffer_size(mut self, size: usize) -> Self {
        self.io_buffer_size = size;
        self
    }

    /// Sets how many records the external sorter keeps in memory.
    pub fn sort_buffer_records(mut self, records: usize) -> Self {
        self.sort_buffer_records = records;
        self
    }

    /// Sets the number of tapes per sorter carousel.
    pub fn num_tapes(mut self, tapes: usize) -> Self {
        self.num_tapes = tapes;
        self
    }

    /// Enables or disables chunk checksum verification.
    pub fn verify_chunk_checksums(mut self, value: bool) -> Self {
        self.verify_chunk_checksums = value;
        self
    }

    /// Returns the temp directory a tape with `id` should be created in.
    pub fn tmp_dir_for(&self, id: usize) -> PathBuf {
        if self.tmp_dirs.is_empty() {
            std::env::temp_dir()
        } else {
            self.tmp_dirs[id % self.tmp_dirs.len()].clone()
        }
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.buffer_capacity == 0 {
            return Err(crate::Error::invalid_argument("buffer_capacity must be > 0"));
        }
        if self.max_record_size == 0 || self.max_record_size > i32::MAX as usize {
            return Err(crate::Error::invalid_argument(
                "max_record_size must be between 1 and i32::MAX",
            ));
        }
        if self.io_buffer_size == 0 {
            return Err(crate::Error::invalid_argument("io_buffer_size must be > 0"));
        }
        if self.sort_buffer_records == 0 {
            return Err(crate::Error::invalid_argument("sort_buffer_records must be > 0"));
        }
        if self.num_tapes < 2 {
            return Err(crate::Error::invalid_argument("num_tapes must be >= 2"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert!(opts.tmp_dirs.is_empty());
        assert!(!opts.spill_to_disk);
        assert_eq!(opts.buffer_capacity, 64 * 1024);
        assert_eq!(opts.num_tapes, 6);
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new()
            .buffer_capacity(1024)
            .spill_to_disk(true)
            .num_tapes(3)
            .tmp_dir("/tmp/a")
            .tmp_dir("/tmp/b");

        assert_eq!(opts.buffer_capacity, 1024);
        assert!(opts.spill_to_disk);
        assert_eq!(opts.num_tapes, 3);
        assert_eq!(opts.tmp_dir_for(0), PathBuf::from("/tmp/a"));
        assert_eq!(opts.tmp_dir_for(3), PathBuf::from("/tmp/b"));
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());

        opts.buffer_capacity = 0;
        assert!(opts.validate().is_err());

        opts.buffer_capacity = 1024;
        opts.num_tapes = 1;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_options_from_json() {
        let opts: Options =
            serde_json::from_str(r#"{"spill_to_disk": true, "num_tapes": 4}"#).unwrap();
        assert!(opts.spill_to_disk);
        assert_eq!(opts.num_tapes, 4);
        assert_eq!(opts.max_record_size, DEFAULT_MAX_RECORD_SIZE);
    }
}
