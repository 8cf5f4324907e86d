//! Dynamic record buffers.
//!
//! A buffer is an arena of framed records. Writing a record returns an
//! [`IndexKey`] (payload offset + length) that can later be used for random
//! access; the buffer can also be replayed sequentially any number of times.
//!
//! ## Variants
//!
//! - **Heap** (`spill_to_disk = false`): one growable in-memory arena whose
//!   capacity doubles whenever a frame does not fit.
//! - **Direct** (`spill_to_disk = true`): a fixed-capacity in-memory window;
//!   when it is full its content is appended to a temp file and the window
//!   is reused. Offsets are logical, so handles survive spills.
//!
//! ## Usage
//!
//! ```rust
//! use recordtape::buffer::DynamicRecordBuffer;
//! use recordtape::Options;
//!
//! # fn main() -> Result<(), recordtape::Error> {
//! let mut buffer = DynamicRecordBuffer::new(Options::default());
//! buffer.init()?;
//! let key = buffer.write_raw(b"payload")?;
//! buffer.flush_buffer()?;
//! buffer.load_data()?;
//!
//! let mut dst = vec![0u8; key.length() as usize];
//! buffer.read(&mut dst, key.position())?;
//! assert_eq!(dst, b"payload");
//! # Ok(())
//! # }
//! ```

mod dynamic;

pub use dynamic::DynamicRecordBuffer;

/// Position handle of a record written to a [`DynamicRecordBuffer`].
///
/// Handles are valid until the buffer is cleared; a handle from before a
/// `clear()` is rejected by [`DynamicRecordBuffer::read_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexKey {
    position: u64,
    length: u32,
    generation: u32,
}

impl IndexKey {
    pub(crate) fn new(position: u64, length: u32, generation: u32) -> Self {
        Self { position, length, generation }
    }

    /// Offset of the first payload byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Payload length in bytes.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Buffer generation the handle was issued in.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}
