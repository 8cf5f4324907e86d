//! Chunked record tapes.
//!
//! A tape is an append-then-replay sequence of framed records split into
//! data chunks. Each chunk is closed by an inline marker carrying the record
//! count and a CRC32 of the chunk's frames:
//!
//! ```text
//! +---------+---------+-----+--------+---------+-----+--------+
//! | frame 0 | frame 1 | ... | marker | frame 0 | ... | marker |
//! +---------+---------+-----+--------+---------+-----+--------+
//! |<---------- chunk 0 ---------->|   |<------ chunk 1 ------>|
//! ```
//!
//! Reading never crosses a chunk boundary on its own: `get` returns `false`
//! at the end of the current chunk and the caller moves on explicitly with
//! `set_data_chunk` or `next_data_chunk`.

mod carousel;

pub use carousel::{CarouselOp, ErrorPolicy, TapeCarousel};

use crate::config::Options;
use crate::error::{Error, Result};
use crate::frame::{self, FrameHeader, CHUNK_END_SIZE, CHUNK_TRAILER_SIZE, FRAME_HEADER_SIZE};
use crate::phase::Phase;
use crate::record::{DataRecord, RecordDeserializer};
use crate::storage::{ByteStorage, StorageProvider};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::sync::Arc;

/// Extent of one data chunk on a tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChunk {
    /// Offset of the first frame
    pub offset: u64,
    /// Bytes of record frames, excluding the end marker
    pub length: u64,
    /// Number of records in the chunk
    pub records: u32,
}

impl DataChunk {
    fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// State of the read cursor inside the current chunk.
#[derive(Debug)]
struct ReadCursor {
    position: u64,
    records: u32,
    hasher: crc32fast::Hasher,
    /// Chunk end marker already reached (and verified)
    at_end: bool,
}

impl ReadCursor {
    fn at(position: u64) -> Self {
        Self { position, records: 0, hasher: crc32fast::Hasher::new(), at_end: false }
    }
}

/// A record tape backed by an exclusively owned [`ByteStorage`].
///
/// # Example
///
/// ```rust
/// use recordtape::storage::MemoryProvider;
/// use recordtape::tape::DataRecordTape;
/// use recordtape::Options;
/// use bytes::BytesMut;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), recordtape::Error> {
/// let mut tape = DataRecordTape::new(Options::default(), Arc::new(MemoryProvider));
/// tape.open(0)?;
/// tape.add_data_chunk()?;
/// tape.put(b"first")?;
/// tape.add_data_chunk()?;
/// tape.put(b"second")?;
///
/// let mut buf = BytesMut::new();
/// tape.set_data_chunk(1)?;
/// assert!(tape.get(&mut buf)?);
/// assert_eq!(&buf[..], b"second");
/// assert!(!tape.get(&mut buf)?);
/// # Ok(())
/// # }
/// ```
pub struct DataRecordTape {
    id: Option<usize>,
    options: Options,
    provider: Arc<dyn StorageProvider>,
    storage: Option<Box<dyn ByteStorage>>,
    chunks: Vec<DataChunk>,
    /// Checksum of the chunk being written; `None` once it has been sealed
    write_hasher: Option<crc32fast::Hasher>,
    current: usize,
    cursor: ReadCursor,
    phase: Phase,
    scratch: Vec<u8>,
    read_buf: BytesMut,
    deserializer: RecordDeserializer,
}

impl DataRecordTape {
    /// Creates a closed tape whose storage will come from `provider`.
    pub fn new(options: Options, provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            id: None,
            options,
            provider,
            storage: None,
            chunks: Vec::new(),
            write_hasher: None,
            current: 0,
            cursor: ReadCursor::at(0),
            phase: Phase::Idle,
            scratch: Vec::new(),
            read_buf: BytesMut::new(),
            deserializer: RecordDeserializer::new(),
        }
    }

    /// Uses `deserializer` for [`get_record`](Self::get_record).
    pub fn with_deserializer(mut self, deserializer: RecordDeserializer) -> Self {
        self.deserializer = deserializer;
        self
    }

    /// Opens the backing store for tape `id`.
    pub fn open(&mut self, id: usize) -> Result<()> {
        if self.storage.is_some() {
            return Err(Error::invalid_state(format!("{} is already open", self)));
        }
        let storage = self.provider.create(id)?;
        log::debug!("opened tape {} on {}", id, storage.describe());
        self.id = Some(id);
        self.storage = Some(storage);
        self.reset_state();
        Ok(())
    }

    fn reset_state(&mut self) {
        self.chunks.clear();
        self.write_hasher = None;
        self.current = 0;
        self.cursor = ReadCursor::at(0);
        self.phase = Phase::Idle;
    }

    fn storage(&mut self) -> Result<&mut Box<dyn ByteStorage>> {
        let id = self.id;
        self.storage
            .as_mut()
            .ok_or_else(|| Error::invalid_state(format!("tape {:?} is not open", id)))
    }

    /// Closes the current chunk and starts a new one.
    pub fn add_data_chunk(&mut self) -> Result<()> {
        self.phase.require("add_data_chunk", &[Phase::Idle, Phase::Writing])?;
        self.seal_chunk()?;
        let offset = self.storage()?.len();
        self.chunks.push(DataChunk { offset, length: 0, records: 0 });
        self.write_hasher = Some(crc32fast::Hasher::new());
        self.phase = Phase::Writing;
        Ok(())
    }

    /// Writes the end marker of the chunk being written, if any.
    fn seal_chunk(&mut self) -> Result<()> {
        let Some(hasher) = self.write_hasher.take() else {
            return Ok(());
        };
        let records = self.chunks.last().map_or(0, |c| c.records);
        let mut marker = [0u8; CHUNK_END_SIZE];
        frame::encode_chunk_end(&mut &mut marker[..], records, hasher.finalize());
        self.storage()?.append(&marker)?;
        Ok(())
    }

    /// Appends one record payload to the current chunk.
    ///
    /// The payload is framed with its length. A chunk is started if none is
    /// open.
    pub fn put(&mut self, payload: &[u8]) -> Result<()> {
        self.put_with(payload.len(), |buf| buf.put_slice(payload))
    }

    /// Serializes `record` and appends it to the current chunk.
    pub fn put_record(&mut self, record: &DataRecord) -> Result<()> {
        self.put_with(record.serialized_size(), |buf| record.serialize(buf))
    }

    fn put_with<F>(&mut self, len: usize, fill: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<u8>),
    {
        self.phase.require("put", &[Phase::Idle, Phase::Writing])?;
        frame::check_payload_len(len, self.options.max_record_size)?;
        if self.write_hasher.is_none() {
            self.add_data_chunk()?;
        }

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.put_i32(len as i32);
        fill(&mut scratch);
        debug_assert_eq!(scratch.len(), frame::frame_len(len));

        let appended = self.storage().and_then(|storage| storage.append(&scratch));
        if appended.is_ok() {
            if let Some(hasher) = self.write_hasher.as_mut() {
                hasher.update(&scratch);
            }
            if let Some(chunk) = self.chunks.last_mut() {
                chunk.length += scratch.len() as u64;
                chunk.records += 1;
            }
        }
        self.scratch = scratch;
        appended.map(|_| ())
    }

    /// Pushes buffered writes to the backing store; `force` syncs them.
    ///
    /// The write chunk stays open.
    pub fn flush(&mut self, force: bool) -> Result<()> {
        self.storage()?.flush(force)
    }

    /// Ends the write phase: closes the open chunk and flushes.
    fn finish_writing(&mut self) -> Result<()> {
        if self.phase.is_writable() {
            self.seal_chunk()?;
            self.storage()?.flush(false)?;
            self.phase = Phase::Reading;
        }
        Ok(())
    }

    fn position_at(&mut self, index: usize) {
        self.current = index;
        let offset = self.chunks.get(index).map_or(0, |c| c.offset);
        self.cursor = ReadCursor::at(offset);
    }

    /// Moves the read cursor to the start of the current chunk.
    ///
    /// After [`next_data_chunk`](Self::next_data_chunk) has run past the last
    /// chunk the cursor goes back to the first one.
    pub fn rewind(&mut self) -> Result<()> {
        self.finish_writing()?;
        let index = if self.current < self.chunks.len() { self.current } else { 0 };
        self.position_at(index);
        Ok(())
    }

    /// Moves the read cursor to the start of chunk `index`.
    pub fn set_data_chunk(&mut self, index: usize) -> Result<()> {
        if index >= self.chunks.len() {
            return Err(Error::ChunkIndex { index, count: self.chunks.len() });
        }
        self.finish_writing()?;
        self.position_at(index);
        Ok(())
    }

    /// Moves the read cursor to the next chunk.
    ///
    /// Returns `false` once past the last chunk; `get` then returns `false`
    /// until the cursor is repositioned.
    pub fn next_data_chunk(&mut self) -> Result<bool> {
        self.finish_writing()?;
        let next = self.current.saturating_add(1).min(self.chunks.len());
        self.position_at(next);
        Ok(next < self.chunks.len())
    }

    /// Reads the next record payload of the current chunk into `buf`.
    ///
    /// Returns `false` at the end of the chunk. With checksum verification
    /// enabled, reaching the end checks the chunk marker.
    pub fn get(&mut self, buf: &mut BytesMut) -> Result<bool> {
        self.phase.require("get", &[Phase::Reading])?;
        let Some(chunk) = self.chunks.get(self.current).copied() else {
            return Ok(false);
        };
        if self.cursor.at_end {
            return Ok(false);
        }
        if self.cursor.position >= chunk.end() {
            self.finish_chunk(&chunk)?;
            return Ok(false);
        }

        let position = self.cursor.position;
        let max_record_size = self.options.max_record_size;
        let storage = self.storage()?;
        let mut header = [0u8; FRAME_HEADER_SIZE];
        storage.read_at(position, &mut header)?;
        let len = match frame::decode_frame_header(header, max_record_size)? {
            FrameHeader::Record(len) => len,
            FrameHeader::ChunkEnd => {
                return Err(Error::corruption(format!(
                    "Chunk marker at {} inside chunk ending at {}",
                    position,
                    chunk.end()
                )))
            }
        };
        let payload_start = position + FRAME_HEADER_SIZE as u64;
        if payload_start + len as u64 > chunk.end() {
            return Err(Error::corruption(format!(
                "Frame of {} bytes at {} overruns chunk ending at {}",
                len,
                position,
                chunk.end()
            )));
        }
        buf.clear();
        buf.resize(len, 0);
        storage.read_at(payload_start, &mut buf[..])?;

        self.cursor.hasher.update(&header);
        self.cursor.hasher.update(&buf[..]);
        self.cursor.position = payload_start + len as u64;
        self.cursor.records += 1;
        Ok(true)
    }

    fn finish_chunk(&mut self, chunk: &DataChunk) -> Result<()> {
        self.cursor.at_end = true;
        if !self.options.verify_chunk_checksums {
            return Ok(());
        }
        let mut marker = [0u8; CHUNK_END_SIZE];
        self.storage()?.read_at(chunk.end(), &mut marker)?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(&marker[..FRAME_HEADER_SIZE]);
        if frame::decode_frame_header(header, self.options.max_record_size)? != FrameHeader::ChunkEnd {
            return Err(Error::corruption(format!("Missing chunk marker at {}", chunk.end())));
        }
        let mut trailer = [0u8; CHUNK_TRAILER_SIZE];
        trailer.copy_from_slice(&marker[FRAME_HEADER_SIZE..]);
        let (records, expected) = frame::decode_chunk_trailer(trailer);
        if records != self.cursor.records {
            return Err(Error::corruption(format!(
                "Chunk at {} holds {} records, marker says {}",
                chunk.offset, self.cursor.records, records
            )));
        }
        let actual = self.cursor.hasher.clone().finalize();
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }

    /// Reads and deserializes the next record of the current chunk.
    ///
    /// Returns `false` at the end of the chunk, leaving `record` untouched.
    pub fn get_record(&mut self, record: &mut DataRecord) -> Result<bool> {
        let mut buf = std::mem::take(&mut self.read_buf);
        let result = self.get(&mut buf).and_then(|found| {
            if found {
                self.deserializer.deserialize(record, &mut &buf[..])?;
            }
            Ok(found)
        });
        self.read_buf = buf;
        result
    }

    /// Discards every chunk and resets both cursors.
    ///
    /// A failure here leaves the tape in an unknown state and is returned as
    /// [`Error::Fatal`].
    pub fn clear(&mut self) -> Result<()> {
        self.storage()
            .and_then(|storage| storage.truncate())
            .map_err(|e| Error::fatal("tape clear", e))?;
        self.reset_state();
        Ok(())
    }

    pub(crate) fn try_close(&mut self) -> Result<()> {
        let Some(mut storage) = self.storage.take() else {
            return Ok(());
        };
        self.reset_state();
        storage.close()
    }

    /// Releases the backing store. Failures are logged; calling again is a
    /// no-op.
    pub fn close(&mut self) {
        if let Err(e) = self.try_close() {
            log::warn!("failed to close tape {:?}: {}", self.id, e);
        }
    }

    /// Returns true while the backing store is open.
    pub fn is_open(&self) -> bool {
        self.storage.is_some()
    }

    /// Id assigned by [`open`](Self::open).
    pub fn id(&self) -> Option<usize> {
        self.id
    }

    /// Number of data chunks written since the last clear.
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Extent of chunk `index`.
    pub fn chunk(&self, index: usize) -> Option<&DataChunk> {
        self.chunks.get(index)
    }

    /// Index of the chunk the read cursor is in.
    pub fn current_chunk(&self) -> usize {
        self.current
    }

    /// Total records across all chunks.
    pub fn num_records(&self) -> u64 {
        self.chunks.iter().map(|c| c.records as u64).sum()
    }

    /// Bytes held by the backing store, markers included.
    pub fn len(&self) -> u64 {
        self.storage.as_ref().map_or(0, |s| s.len())
    }

    /// Returns true if no chunk has been started.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl fmt::Debug for DataRecordTape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRecordTape")
            .field("id", &self.id)
            .field("storage", &self.storage)
            .field("chunks", &self.chunks)
            .field("current", &self.current)
            .field("phase", &self.phase)
            .finish()
    }
}

impl fmt::Display for DataRecordTape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "DataRecordTape#{}", id)?,
            None => write!(f, "DataRecordTape#-")?,
        }
        write!(f, " [chunks={}, bytes={}, phase={}]", self.chunks.len(), self.len(), self.phase)?;
        for (i, chunk) in self.chunks.iter().enumerate() {
            write!(f, " #{}@{}+{}:{}", i, chunk.offset, chunk.length, chunk.records)?;
        }
        Ok(())
    }
}

impl Drop for DataRecordTape {
    fn drop(&mut self) {
        self.close();
    }
}
