//! A fixed set of tapes driven as a unit.

use super::DataRecordTape;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::storage::{StorageProvider, TempDirProvider};
use std::sync::Arc;

/// Carousel-wide operations with a fixed error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarouselOp {
    /// Open every tape
    Open,
    /// Flush every tape
    Flush,
    /// Close every tape
    Free,
    /// Rewind every tape
    Rewind,
    /// Clear every tape
    Clear,
}

impl CarouselOp {
    /// Name used in log messages and fatal errors.
    pub const fn name(self) -> &'static str {
        match self {
            CarouselOp::Open => "carousel open",
            CarouselOp::Flush => "carousel flush",
            CarouselOp::Free => "carousel free",
            CarouselOp::Rewind => "carousel rewind",
            CarouselOp::Clear => "carousel clear",
        }
    }
}

/// What a carousel does when one of its tapes fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log the failure and continue with the remaining tapes.
    Swallow,
    /// Stop and return the first failure.
    Propagate,
    /// Stop and return the first failure as [`Error::Fatal`].
    Fatal,
}

impl ErrorPolicy {
    /// The policy applied to `op`.
    pub const fn for_operation(op: CarouselOp) -> Self {
        match op {
            CarouselOp::Flush | CarouselOp::Free => ErrorPolicy::Swallow,
            CarouselOp::Open | CarouselOp::Rewind => ErrorPolicy::Propagate,
            CarouselOp::Clear => ErrorPolicy::Fatal,
        }
    }
}

/// Owns `N` tapes with ids `0..N`.
///
/// [`get_first_tape`](Self::get_first_tape) and
/// [`get_next_tape`](Self::get_next_tape) walk the tapes once in id order;
/// the walk does not wrap around.
#[derive(Debug)]
pub struct TapeCarousel {
    tapes: Vec<DataRecordTape>,
    /// Index of the tape returned last; `None` before the first call
    cursor: Option<usize>,
    open: bool,
}

impl TapeCarousel {
    /// Creates a carousel of temp-file tapes spread over `options.tmp_dirs`.
    pub fn new(num_tapes: usize, options: Options) -> Self {
        let provider = Arc::new(TempDirProvider::new(options.clone()));
        Self::with_provider(num_tapes, options, provider)
    }

    /// Creates a carousel whose tapes get their storage from `provider`.
    pub fn with_provider(num_tapes: usize, options: Options, provider: Arc<dyn StorageProvider>) -> Self {
        let tapes = (0..num_tapes)
            .map(|_| DataRecordTape::new(options.clone(), provider.clone()))
            .collect();
        Self { tapes, cursor: None, open: false }
    }

    /// Opens every tape.
    ///
    /// If one tape fails, the tapes opened before it are closed again and the
    /// carousel stays closed.
    pub fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::invalid_state("carousel is already open"));
        }
        for id in 0..self.tapes.len() {
            if let Err(e) = self.tapes[id].open(id) {
                log::warn!("failed to open tape {} of {}, rolling back: {}", id, self.tapes.len(), e);
                for tape in &mut self.tapes[..id] {
                    tape.close();
                }
                return Err(e);
            }
        }
        self.cursor = None;
        self.open = true;
        log::debug!("opened carousel of {} tapes", self.tapes.len());
        Ok(())
    }

    /// Returns tape 0 and restarts the walk from it.
    pub fn get_first_tape(&mut self) -> Option<&mut DataRecordTape> {
        self.get_tape(0)
    }

    /// Returns the tape after the one returned last, or `None` once the last
    /// tape has been handed out.
    pub fn get_next_tape(&mut self) -> Option<&mut DataRecordTape> {
        let next = self.cursor.map_or(0, |c| c.saturating_add(1));
        if next < self.tapes.len() {
            self.cursor = Some(next);
            self.tapes.get_mut(next)
        } else {
            self.cursor = Some(self.tapes.len());
            None
        }
    }

    /// Returns tape `order` and moves the walk to it.
    pub fn get_tape(&mut self, order: usize) -> Option<&mut DataRecordTape> {
        if order >= self.tapes.len() {
            return None;
        }
        self.cursor = Some(order);
        self.tapes.get_mut(order)
    }

    /// Returns the tape the walk is at.
    pub fn current_tape(&mut self) -> Option<&mut DataRecordTape> {
        let index = self.cursor?;
        self.tapes.get_mut(index)
    }

    /// Iterates over all tapes without moving the walk.
    pub fn tapes_mut(&mut self) -> impl Iterator<Item = &mut DataRecordTape> {
        self.tapes.iter_mut()
    }

    /// Number of tapes.
    pub fn num_tapes(&self) -> usize {
        self.tapes.len()
    }

    /// Returns true between a successful `open` and `free`.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Flushes every tape, logging failures. Returns the number of tapes
    /// that failed.
    pub fn flush(&mut self, force: bool) -> usize {
        self.swallow_each(CarouselOp::Flush, |tape| tape.flush(force))
    }

    /// Closes every tape, logging failures. Returns the number of tapes that
    /// failed.
    pub fn free(&mut self) -> usize {
        let failures = self.swallow_each(CarouselOp::Free, |tape| tape.try_close());
        self.open = false;
        self.cursor = None;
        failures
    }

    /// Rewinds every tape to the start of its current chunk.
    pub fn rewind(&mut self) -> Result<()> {
        self.for_each(CarouselOp::Rewind, |tape| tape.rewind())
    }

    /// Clears every tape. Any failure is fatal.
    pub fn clear(&mut self) -> Result<()> {
        self.for_each(CarouselOp::Clear, |tape| tape.clear())?;
        self.cursor = None;
        Ok(())
    }

    /// Moves every tape to its next chunk. Returns true if at least one tape
    /// had another chunk.
    pub fn has_more_chunks(&mut self) -> Result<bool> {
        let mut more = false;
        for tape in &mut self.tapes {
            more |= tape.next_data_chunk()?;
        }
        Ok(more)
    }

    /// Applies `f` to every tape under the policy of `op`.
    fn for_each<F>(&mut self, op: CarouselOp, mut f: F) -> Result<()>
    where
        F: FnMut(&mut DataRecordTape) -> Result<()>,
    {
        let policy = ErrorPolicy::for_operation(op);
        for tape in &mut self.tapes {
            let Err(e) = f(tape) else {
                continue;
            };
            match policy {
                ErrorPolicy::Swallow => {
                    log::warn!("{} failed on tape {:?}, continuing: {}", op.name(), tape.id(), e)
                }
                ErrorPolicy::Propagate => return Err(e),
                ErrorPolicy::Fatal => {
                    log::error!("{} failed on tape {:?}: {}", op.name(), tape.id(), e);
                    return Err(Error::fatal(op.name(), e));
                }
            }
        }
        Ok(())
    }

    fn swallow_each<F>(&mut self, op: CarouselOp, mut f: F) -> usize
    where
        F: FnMut(&mut DataRecordTape) -> Result<()>,
    {
        debug_assert_eq!(ErrorPolicy::for_operation(op), ErrorPolicy::Swallow);
        let mut failures = 0;
        let counted = self.for_each(op, |tape| {
            if let Err(e) = f(tape) {
                failures += 1;
                return Err(e);
            }
            Ok(())
        });
        debug_assert!(counted.is_ok());
        failures
    }
}

impl Drop for TapeCarousel {
    fn drop(&mut self) {
        if self.open {
            self.free();
        }
    }
}
