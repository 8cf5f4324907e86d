//! Write-once, read-many record buffer with optional spill to disk.

use super::IndexKey;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::frame::{self, FrameHeader, FRAME_HEADER_SIZE};
use crate::phase::Phase;
use crate::record::{DataRecord, RecordDeserializer};
use crate::storage::{ByteStorage, FileStorage};
use bytes::{BufMut, Bytes};

/// Buffer of serialized records addressed by [`IndexKey`]s.
///
/// The lifecycle is two-phase: records are written, then
/// [`flush_buffer`](Self::flush_buffer) and [`load_data`](Self::load_data)
/// switch the buffer to reading. Reading and writing are never interleaved;
/// calls made in the wrong phase fail with [`Error::InvalidState`].
#[derive(Debug)]
pub struct DynamicRecordBuffer {
    options: Options,
    /// In-memory arena; holds logical bytes `memory_base..len()`
    memory: Vec<u8>,
    /// Logical offset of `memory[0]`, equal to the spilled byte count
    memory_base: u64,
    /// Spill file, created on first spill
    spill: Option<FileStorage>,
    phase: Phase,
    initialized: bool,
    /// Set when an append to the spill file failed part way; cleared by `clear`
    failed: bool,
    read_cursor: u64,
    records: u64,
    generation: u32,
    deserializer: RecordDeserializer,
}

impl DynamicRecordBuffer {
    /// Creates a buffer. No memory is allocated until [`init`](Self::init).
    pub fn new(options: Options) -> Self {
        Self {
            options,
            memory: Vec::new(),
            memory_base: 0,
            spill: None,
            phase: Phase::Idle,
            initialized: false,
            failed: false,
            read_cursor: 0,
            records: 0,
            generation: 0,
            deserializer: RecordDeserializer::new(),
        }
    }

    /// Uses `deserializer` for [`next`](Self::next) and
    /// [`read_record`](Self::read_record).
    pub fn with_deserializer(mut self, deserializer: RecordDeserializer) -> Self {
        self.deserializer = deserializer;
        self
    }

    /// Allocates the initial arena.
    ///
    /// Fails with [`Error::Initialization`] if `buffer_capacity` bytes cannot
    /// be allocated. Calling `init` again is a no-op.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.options.validate()?;
        let capacity = self.options.buffer_capacity;
        self.memory.try_reserve_exact(capacity).map_err(|e| {
            Error::Initialization(format!("cannot allocate {} byte record buffer: {}", capacity, e))
        })?;
        self.initialized = true;
        Ok(())
    }

    /// Serializes `record` and appends it.
    pub fn write(&mut self, record: &DataRecord) -> Result<IndexKey> {
        let size = record.serialized_size();
        self.append_frame(size, |buf| record.serialize(buf))
    }

    /// Appends an already serialized payload.
    pub fn write_raw(&mut self, payload: &[u8]) -> Result<IndexKey> {
        self.append_frame(payload.len(), |buf| buf.put_slice(payload))
    }

    fn append_frame<F>(&mut self, len: usize, fill: F) -> Result<IndexKey>
    where
        F: FnOnce(&mut Vec<u8>),
    {
        self.phase.require("write", &[Phase::Idle, Phase::Writing])?;
        if !self.initialized {
            return Err(Error::invalid_state("record buffer is not initialized"));
        }
        self.ensure_not_failed()?;
        frame::check_payload_len(len, self.options.max_record_size)?;

        let frame_len = frame::frame_len(len);
        let position = self.len() + FRAME_HEADER_SIZE as u64;

        if self.options.spill_to_disk {
            if self.memory.len() + frame_len > self.options.buffer_capacity {
                self.spill()?;
            }
            if frame_len > self.options.buffer_capacity {
                // Bigger than the whole window; goes straight to the spill file.
                let mut oversized = Vec::with_capacity(frame_len);
                oversized.put_i32(len as i32);
                fill(&mut oversized);
                let file = self.spill_file()?;
                let appended = file.append(&oversized).map(|_| file.len());
                match appended {
                    Ok(len) => self.memory_base = len,
                    Err(e) => {
                        self.failed = true;
                        return Err(e);
                    }
                }
            } else {
                self.memory.put_i32(len as i32);
                fill(&mut self.memory);
            }
        } else {
            self.grow_for(frame_len)?;
            self.memory.put_i32(len as i32);
            fill(&mut self.memory);
        }

        debug_assert_eq!(self.len(), position + len as u64);
        self.records += 1;
        self.phase = Phase::Writing;
        Ok(IndexKey::new(position, len as u32, self.generation))
    }

    /// Doubles the arena until `additional` more bytes fit.
    fn grow_for(&mut self, additional: usize) -> Result<()> {
        let needed = self.memory.len() + additional;
        if needed <= self.memory.capacity() {
            return Ok(());
        }
        let target = needed.max(self.memory.capacity() * 2);
        self.memory.try_reserve_exact(target - self.memory.len()).map_err(|e| {
            Error::Initialization(format!("cannot grow record buffer to {} bytes: {}", target, e))
        })
    }

    fn spill_file(&mut self) -> Result<&mut FileStorage> {
        if self.spill.is_none() {
            let dir = self.options.tmp_dir_for(0);
            let storage = FileStorage::create_in(&dir, "spill-", self.options.io_buffer_size)?;
            self.spill = Some(storage);
        }
        self.spill
            .as_mut()
            .ok_or_else(|| Error::invalid_state("spill file unavailable"))
    }

    fn ensure_not_failed(&self) -> Result<()> {
        if self.failed {
            return Err(Error::invalid_state("record buffer spill failed; clear() it before reuse"));
        }
        Ok(())
    }

    /// Moves the in-memory window to the spill file.
    ///
    /// The window is kept when the append fails, so buffered records and
    /// outstanding handles stay valid.
    fn spill(&mut self) -> Result<()> {
        if self.memory.is_empty() {
            return Ok(());
        }
        self.spill_file()?;
        let file = self
            .spill
            .as_mut()
            .ok_or_else(|| Error::invalid_state("spill file unavailable"))?;
        if let Err(e) = file.append(&self.memory) {
            // The file may hold part of the window past its logical end
            self.failed = true;
            return Err(e);
        }
        self.memory_base = file.len();
        log::trace!("spilled {} buffered bytes to disk", self.memory.len());
        self.memory.clear();
        Ok(())
    }

    /// Ends the write phase, materializing buffered bytes in secondary
    /// storage for spill-capable buffers.
    pub fn flush_buffer(&mut self) -> Result<()> {
        self.phase.require("flush_buffer", &[Phase::Idle, Phase::Writing])?;
        self.ensure_not_failed()?;
        if self.options.spill_to_disk {
            self.spill()?;
        }
        if let Some(file) = self.spill.as_mut() {
            file.flush(false)?;
        }
        self.phase = Phase::Flushed;
        Ok(())
    }

    /// Starts the read phase with the cursor at the first record.
    pub fn load_data(&mut self) -> Result<()> {
        self.phase.require("load_data", &[Phase::Flushed])?;
        self.read_cursor = 0;
        self.phase = Phase::Reading;
        Ok(())
    }

    /// Copies the payload starting at `position` into `dst`.
    ///
    /// `dst` must be sized to the payload length taken from the record's
    /// [`IndexKey`]. A position that does not start a payload of that length
    /// fails with [`Error::OutOfRange`].
    pub fn read(&mut self, dst: &mut [u8], position: u64) -> Result<()> {
        self.phase.require("read", &[Phase::Reading])?;
        let out_of_range = Error::OutOfRange { position, length: dst.len(), size: self.len() };
        let header_pos = match position.checked_sub(FRAME_HEADER_SIZE as u64) {
            Some(pos) if position.saturating_add(dst.len() as u64) <= self.len() => pos,
            _ => return Err(out_of_range),
        };
        match self.read_header(header_pos) {
            Ok(FrameHeader::Record(len)) if len == dst.len() => self.copy_range(position, dst),
            _ => Err(out_of_range),
        }
    }

    /// Reads the payload a handle points at, verifying its frame.
    pub fn read_key(&mut self, key: &IndexKey) -> Result<Bytes> {
        self.phase.require("read", &[Phase::Reading])?;
        if key.generation() != self.generation {
            return Err(Error::invalid_argument(format!(
                "IndexKey from generation {} used after clear (current generation {})",
                key.generation(),
                self.generation
            )));
        }
        let header_pos = key.position().checked_sub(FRAME_HEADER_SIZE as u64).ok_or(
            Error::OutOfRange { position: key.position(), length: key.length() as usize, size: self.len() },
        )?;
        match self.read_header(header_pos)? {
            FrameHeader::Record(len) if len == key.length() as usize => {}
            other => {
                return Err(Error::corruption(format!(
                    "Frame at {} is {:?}, handle expects {} bytes",
                    header_pos,
                    other,
                    key.length()
                )))
            }
        }
        let mut payload = vec![0u8; key.length() as usize];
        self.copy_range(key.position(), &mut payload)?;
        Ok(Bytes::from(payload))
    }

    /// Reads and deserializes the record a handle points at.
    pub fn read_record(&mut self, key: &IndexKey, record: &mut DataRecord) -> Result<()> {
        let mut payload = self.read_key(key)?;
        self.deserializer.deserialize(record, &mut payload)
    }

    /// Returns the next payload in write order, or `None` once exhausted.
    pub fn next_raw(&mut self) -> Result<Option<Bytes>> {
        self.phase.require("next", &[Phase::Reading])?;
        if self.read_cursor >= self.len() {
            return Ok(None);
        }
        let len = match self.read_header(self.read_cursor)? {
            FrameHeader::Record(len) => len,
            FrameHeader::ChunkEnd => {
                return Err(Error::corruption(format!(
                    "Unexpected chunk marker at {} in record buffer",
                    self.read_cursor
                )))
            }
        };
        let mut payload = vec![0u8; len];
        self.copy_range(self.read_cursor + FRAME_HEADER_SIZE as u64, &mut payload)?;
        self.read_cursor += frame::frame_len(len) as u64;
        Ok(Some(Bytes::from(payload)))
    }

    /// Deserializes the next record into `record`.
    ///
    /// Returns `false` and leaves `record` untouched once exhausted.
    pub fn next(&mut self, record: &mut DataRecord) -> Result<bool> {
        match self.next_raw()? {
            Some(mut payload) => {
                self.deserializer.deserialize(record, &mut payload)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rewinds the read cursor without discarding data.
    pub fn reset(&mut self) -> Result<()> {
        self.phase.require("reset", &[Phase::Reading])?;
        self.read_cursor = 0;
        Ok(())
    }

    /// Discards all data and invalidates every outstanding handle.
    ///
    /// A failure to truncate the spill file is fatal.
    pub fn clear(&mut self) -> Result<()> {
        self.memory.clear();
        if !self.options.spill_to_disk {
            self.memory.shrink_to(self.options.buffer_capacity);
        }
        if let Some(file) = self.spill.as_mut() {
            file.truncate().map_err(|e| Error::fatal("record buffer clear", e))?;
        }
        self.memory_base = 0;
        self.read_cursor = 0;
        self.records = 0;
        self.failed = false;
        self.generation = self.generation.wrapping_add(1);
        self.phase = Phase::Idle;
        Ok(())
    }

    /// Releases memory and deletes the spill file. Failures are logged.
    pub fn close(&mut self) {
        if let Some(mut file) = self.spill.take() {
            if let Err(e) = file.close() {
                log::warn!("failed to remove spill file {}: {}", file.describe(), e);
            }
        }
        self.memory = Vec::new();
        self.memory_base = 0;
        self.read_cursor = 0;
        self.records = 0;
        self.failed = false;
        self.generation = self.generation.wrapping_add(1);
        self.initialized = false;
        self.phase = Phase::Idle;
    }

    fn read_header(&mut self, position: u64) -> Result<FrameHeader> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.copy_range(position, &mut header)?;
        frame::decode_frame_header(header, self.options.max_record_size)
    }

    /// Copies logical bytes `position..position + dst.len()`, reading the
    /// spilled prefix from disk and the rest from memory.
    fn copy_range(&mut self, position: u64, dst: &mut [u8]) -> Result<()> {
        let size = self.len();
        let end = position.saturating_add(dst.len() as u64);
        if end > size {
            return Err(Error::OutOfRange { position, length: dst.len(), size });
        }

        let mut filled = 0usize;
        if position < self.memory_base {
            let from_disk = (end.min(self.memory_base) - position) as usize;
            let file = self
                .spill
                .as_mut()
                .ok_or_else(|| Error::invalid_state("spilled bytes without a spill file"))?;
            file.read_at(position, &mut dst[..from_disk])?;
            filled = from_disk;
        }
        if filled < dst.len() {
            let start = (position + filled as u64 - self.memory_base) as usize;
            let remaining = dst.len() - filled;
            dst[filled..].copy_from_slice(&self.memory[start..start + remaining]);
        }
        Ok(())
    }

    /// Total bytes written, in memory and spilled.
    pub fn len(&self) -> u64 {
        self.memory_base + self.memory.len() as u64
    }

    /// Returns true if no record has been written since the last clear.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Number of records written since the last clear.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Returns true if some data lives in the spill file.
    pub fn is_spilled(&self) -> bool {
        self.memory_base > 0
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl Drop for DynamicRecordBuffer {
    fn drop(&mut self) {
        // Best effort removal of the spill file
        self.close();
    }
}
