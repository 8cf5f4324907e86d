//! # recordtape - Record Buffers, Tapes and External Sort
//!
//! recordtape is the spill-to-disk core of a record processing engine. It
//! holds serialized records in growable buffers, replays them from chunked
//! tapes and sorts streams larger than memory by merging runs across a
//! carousel of tapes.
//!
//! ## Architecture
//!
//! - **Frame**: `[i32 length][payload]`, the one on-disk record format
//! - **DynamicRecordBuffer**: arena of frames with `IndexKey` handles, growing
//!   in memory or spilling to a temp file
//! - **DataRecordTape**: append-then-replay frames split into data chunks
//! - **TapeCarousel**: a fixed set of tapes driven as a unit
//! - **RecordKey / HashKey**: comparison and hash identity over key fields
//! - **ExternalSorter**: run generation plus multi-level tape merge
//!
//! ## Example Usage
//!
//! ```rust
//! use recordtape::metadata::{FieldType, RecordMetadata};
//! use recordtape::record::{DataRecord, Value};
//! use recordtape::storage::MemoryProvider;
//! use recordtape::tape::DataRecordTape;
//! use recordtape::Options;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), recordtape::Error> {
//! let metadata = Arc::new(
//!     RecordMetadata::new("customer")
//!         .with_field("id", FieldType::Long)
//!         .with_field("name", FieldType::String),
//! );
//! let record = DataRecord::from_values(
//!     metadata.clone(),
//!     vec![Value::Long(1), Value::from("acme")],
//! )?;
//!
//! let mut tape = DataRecordTape::new(Options::default(), Arc::new(MemoryProvider));
//! tape.open(0)?;
//! tape.add_data_chunk()?;
//! tape.put_record(&record)?;
//! tape.rewind()?;
//!
//! let mut read = DataRecord::new(metadata);
//! assert!(tape.get_record(&mut read)?);
//! assert_eq!(read, record);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod buffer;
pub mod config;
pub mod error;
pub mod frame;
pub mod intern;
pub mod key;
pub mod metadata;
pub mod phase;
pub mod record;
pub mod sort;
pub mod storage;
pub mod tape;

// Re-exports
pub use buffer::{DynamicRecordBuffer, IndexKey};
pub use config::Options;
pub use error::{Error, Result};
pub use key::{HashKey, RecordKey};
pub use record::{DataRecord, Value};
pub use sort::ExternalSorter;
pub use tape::{DataRecordTape, TapeCarousel};
