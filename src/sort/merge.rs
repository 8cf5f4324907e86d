//! N-way merge of the current chunk of every tape in a carousel.

use crate::error::{Error, Result};
use crate::key::RecordKey;
use crate::metadata::RecordMetadata;
use crate::record::DataRecord;
use crate::tape::TapeCarousel;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Entry in the merge heap
struct MergeEntry {
    record: DataRecord,
    tape: usize,
    key: Arc<RecordKey>,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest key first)
        self.key.compare(&other.record, &self.record).then_with(|| {
            // For equal keys, prefer the lower tape
            other.tape.cmp(&self.tape)
        })
    }
}

/// Merges the current chunk of every tape into one ordered stream.
///
/// The merger holds one record per tape; the carousel is passed to every
/// call so that the caller keeps ownership of it.
pub(super) struct ChunkMerger {
    heap: BinaryHeap<MergeEntry>,
    key: Arc<RecordKey>,
    metadata: Arc<RecordMetadata>,
}

impl ChunkMerger {
    /// Reads the first record of the current chunk of every tape.
    pub(super) fn start(
        carousel: &mut TapeCarousel,
        key: &Arc<RecordKey>,
        metadata: &Arc<RecordMetadata>,
    ) -> Result<Self> {
        let mut merger = Self {
            heap: BinaryHeap::with_capacity(carousel.num_tapes()),
            key: key.clone(),
            metadata: metadata.clone(),
        };
        for tape in 0..carousel.num_tapes() {
            merger.advance(carousel, tape)?;
        }
        Ok(merger)
    }

    /// Pushes the next record of `tape`, if its chunk has one.
    fn advance(&mut self, carousel: &mut TapeCarousel, tape: usize) -> Result<()> {
        let source = carousel
            .get_tape(tape)
            .ok_or_else(|| Error::invalid_state(format!("merge source tape {} does not exist", tape)))?;
        let mut record = DataRecord::new(self.metadata.clone());
        if source.get_record(&mut record)? {
            self.heap.push(MergeEntry { record, tape, key: self.key.clone() });
        }
        Ok(())
    }

    /// Returns the smallest remaining record.
    pub(super) fn next(&mut self, carousel: &mut TapeCarousel) -> Result<Option<DataRecord>> {
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };
        self.advance(carousel, entry.tape)?;
        Ok(Some(entry.record))
    }
}
