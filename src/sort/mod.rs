//! External sort of data records over tape carousels.
//!
//! Records are collected in memory. Whenever `sort_buffer_records` records
//! are held, they are sorted and written as one data chunk (a run) to the
//! next tape of a carousel. `sort()` then merges runs level by level until
//! every tape holds at most one chunk, and `get()` streams the final N-way
//! merge.
//!
//! ```text
//! level 0:  tape0 [r0 r3 r6]  tape1 [r1 r4]  tape2 [r2 r5]
//! level 1:  tape0 [r0+r1+r2]  tape1 [r3+r4+r5]  tape2 [r6]
//! final:    merge(tape0, tape1, tape2)
//! ```

mod merge;

use crate::config::Options;
use crate::error::{Error, Result};
use crate::key::RecordKey;
use crate::metadata::RecordMetadata;
use crate::record::DataRecord;
use crate::storage::{StorageProvider, TempDirProvider};
use crate::tape::{DataRecordTape, TapeCarousel};
use merge::ChunkMerger;
use std::sync::Arc;

enum SortState {
    Collecting,
    InMemory(std::vec::IntoIter<DataRecord>),
    Merging { carousel: TapeCarousel, merger: ChunkMerger },
    Done,
}

/// Sorts an unbounded stream of records by a [`RecordKey`].
///
/// # Example
///
/// ```rust
/// use recordtape::key::RecordKey;
/// use recordtape::metadata::{FieldType, RecordMetadata};
/// use recordtape::record::{DataRecord, Value};
/// use recordtape::sort::ExternalSorter;
/// use recordtape::Options;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), recordtape::Error> {
/// let md = Arc::new(RecordMetadata::new("n").with_field("v", FieldType::Integer));
/// let key = RecordKey::new(&["v"], md.clone())?;
/// let mut sorter = ExternalSorter::new(md.clone(), key, Options::default())?;
/// for v in [3, 1, 2] {
///     sorter.put(&DataRecord::from_values(md.clone(), vec![Value::Integer(v)])?)?;
/// }
/// sorter.sort()?;
/// let mut sorted = Vec::new();
/// while let Some(record) = sorter.get()? {
///     sorted.push(record.get(0).clone());
/// }
/// assert_eq!(sorted, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
/// # Ok(())
/// # }
/// ```
pub struct ExternalSorter {
    metadata: Arc<RecordMetadata>,
    key: Arc<RecordKey>,
    options: Options,
    provider: Arc<dyn StorageProvider>,
    buffer: Vec<DataRecord>,
    carousel: Option<TapeCarousel>,
    state: SortState,
    runs: usize,
    records: u64,
}

impl ExternalSorter {
    /// Creates a sorter spilling to temp files under `options.tmp_dirs`.
    pub fn new(metadata: Arc<RecordMetadata>, key: RecordKey, options: Options) -> Result<Self> {
        let provider = Arc::new(TempDirProvider::new(options.clone()));
        Self::with_provider(metadata, key, options, provider)
    }

    /// Creates a sorter whose tapes get their storage from `provider`.
    pub fn with_provider(
        metadata: Arc<RecordMetadata>,
        key: RecordKey,
        options: Options,
        provider: Arc<dyn StorageProvider>,
    ) -> Result<Self> {
        options.validate()?;
        if key.metadata().as_ref() != metadata.as_ref() {
            return Err(Error::configuration(format!(
                "Sort key {} was built for record '{}', sorter sorts '{}'",
                key,
                key.metadata().name(),
                metadata.name()
            )));
        }
        Ok(Self {
            metadata,
            key: Arc::new(key),
            buffer: Vec::with_capacity(options.sort_buffer_records.min(1024)),
            options,
            provider,
            carousel: None,
            state: SortState::Collecting,
            runs: 0,
            records: 0,
        })
    }

    /// Adds a record to be sorted.
    pub fn put(&mut self, record: &DataRecord) -> Result<()> {
        if !matches!(self.state, SortState::Collecting) {
            return Err(Error::invalid_state("put after sort() requires free()"));
        }
        self.key.check_record(record)?;
        self.buffer.push(record.clone());
        self.records += 1;
        if self.buffer.len() >= self.options.sort_buffer_records {
            self.spill_run()?;
        }
        Ok(())
    }

    fn open_carousel(&self) -> Result<TapeCarousel> {
        let mut carousel =
            TapeCarousel::with_provider(self.options.num_tapes, self.options.clone(), self.provider.clone());
        carousel.open()?;
        Ok(carousel)
    }

    /// Sorts the buffered records and writes them as a run on the next tape.
    fn spill_run(&mut self) -> Result<()> {
        if self.carousel.is_none() {
            self.carousel = Some(self.open_carousel()?);
        }
        let key = self.key.clone();
        self.buffer.sort_by(|a, b| key.compare(a, b));

        let carousel = self
            .carousel
            .as_mut()
            .ok_or_else(|| Error::invalid_state("sort carousel is not open"))?;
        let tape = next_tape_wrapping(carousel)?;
        tape.add_data_chunk()?;
        for record in &self.buffer {
            tape.put_record(record)?;
        }
        tape.flush(false)?;
        log::debug!("spilled run {} of {} records to {}", self.runs, self.buffer.len(), tape);
        self.buffer.clear();
        self.runs += 1;
        Ok(())
    }

    /// Finishes input and prepares sorted output for [`get`](Self::get).
    pub fn sort(&mut self) -> Result<()> {
        if !matches!(self.state, SortState::Collecting) {
            return Err(Error::invalid_state("sort() called twice"));
        }
        if self.carousel.is_none() {
            let key = self.key.clone();
            self.buffer.sort_by(|a, b| key.compare(a, b));
            self.state = SortState::InMemory(std::mem::take(&mut self.buffer).into_iter());
            return Ok(());
        }

        if !self.buffer.is_empty() {
            self.spill_run()?;
        }
        let mut carousel = self
            .carousel
            .take()
            .ok_or_else(|| Error::invalid_state("sort carousel is not open"))?;
        carousel.rewind()?;
        let mut carousel = self.merge_levels(carousel)?;
        let merger = ChunkMerger::start(&mut carousel, &self.key, &self.metadata)?;
        self.state = SortState::Merging { carousel, merger };
        Ok(())
    }

    /// Merges chunks between two carousels until no tape of the result holds
    /// more than one chunk.
    fn merge_levels(&self, mut source: TapeCarousel) -> Result<TapeCarousel> {
        let mut spare: Option<TapeCarousel> = None;
        let mut level = 0;
        while source.tapes_mut().any(|tape| tape.num_chunks() > 1) {
            let mut target = match spare.take() {
                Some(target) => target,
                None => self.open_carousel()?,
            };
            let mut chunks = 0;
            loop {
                let mut merger = ChunkMerger::start(&mut source, &self.key, &self.metadata)?;
                let tape = next_tape_wrapping(&mut target)?;
                tape.add_data_chunk()?;
                while let Some(record) = merger.next(&mut source)? {
                    tape.put_record(&record)?;
                }
                chunks += 1;
                if !source.has_more_chunks()? {
                    break;
                }
            }
            target.rewind()?;
            source.clear()?;
            log::debug!("merge level {} produced {} chunks", level, chunks);

            spare = Some(source);
            source = target;
            level += 1;
        }
        if let Some(mut spare) = spare {
            spare.free();
        }
        Ok(source)
    }

    /// Returns the next record in key order, or `None` once all records have
    /// been returned.
    pub fn get(&mut self) -> Result<Option<DataRecord>> {
        let next = match &mut self.state {
            SortState::Collecting => return Err(Error::invalid_state("get() before sort()")),
            SortState::InMemory(records) => records.next(),
            SortState::Merging { carousel, merger } => merger.next(carousel)?,
            SortState::Done => None,
        };
        if next.is_none() {
            self.finish();
        }
        Ok(next)
    }

    fn finish(&mut self) {
        if let SortState::Merging { mut carousel, .. } =
            std::mem::replace(&mut self.state, SortState::Done)
        {
            carousel.free();
        }
    }

    /// Releases tapes and buffered records; the sorter accepts input again.
    pub fn free(&mut self) {
        self.finish();
        if let Some(mut carousel) = self.carousel.take() {
            carousel.free();
        }
        self.buffer.clear();
        self.state = SortState::Collecting;
        self.runs = 0;
        self.records = 0;
    }

    /// Number of runs written to tapes.
    pub fn num_runs(&self) -> usize {
        self.runs
    }

    /// Number of records put since creation or the last `free`.
    pub fn num_records(&self) -> u64 {
        self.records
    }

    /// The sort key.
    pub fn key(&self) -> &RecordKey {
        &self.key
    }
}

impl Drop for ExternalSorter {
    fn drop(&mut self) {
        self.free();
    }
}

/// Moves the carousel walk forward, starting over at the first tape after
/// the last one.
fn next_tape_wrapping(carousel: &mut TapeCarousel) -> Result<&mut DataRecordTape> {
    if carousel.get_next_tape().is_none() {
        carousel.get_first_tape();
    }
    carousel
        .current_tape()
        .ok_or_else(|| Error::invalid_state("carousel has no tapes"))
}
