//! Value interning for deserialized records.
//!
//! Provides an explicitly owned pool that maps a string value to one shared
//! `Arc<str>` so that repeated values decoded from tapes share an allocation.
//! The pool is injected where it is needed; there is no process-wide state.

mod pool;

pub use pool::{EvictionPolicy, InternPool, InternStats};
