//! Write/read phase tracking for buffers and tapes.
//!
//! Stores are driven by one producer and then one consumer, never both at
//! once. The phase records where in that lifecycle a store is:
//!
//! ```text
//! Idle --write--> Writing --flush--> Flushed --load--> Reading
//!   ^                                                     |
//!   +------------------------- clear ---------------------+
//! ```
//!
//! Every operation names the phases it accepts and fails fast with
//! [`Error::InvalidState`] otherwise.

use crate::error::{Error, Result};
use std::fmt;

/// Lifecycle phase of a buffer or tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing written since creation or the last clear.
    #[default]
    Idle,
    /// Accepting writes.
    Writing,
    /// Writes finished and materialized; not yet readable.
    Flushed,
    /// Replaying written data.
    Reading,
}

impl Phase {
    /// Fail unless the current phase is one of `allowed`.
    pub fn require(self, operation: &str, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(Error::invalid_state(format!(
                "{} is not allowed in phase {} (expected one of {:?})",
                operation, self, allowed
            )))
        }
    }

    /// Returns true if writes are accepted.
    pub fn is_writable(self) -> bool {
        matches!(self, Phase::Idle | Phase::Writing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "Idle",
            Phase::Writing => "Writing",
            Phase::Flushed => "Flushed",
            Phase::Reading => "Reading",
        };
        f.write_str(name)
    }
}
