use super::RecordKey;
use crate::error::Result;
use crate::record::{DataRecord, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A record viewed through a [`RecordKey`], usable as a hash map key.
///
/// Two hash keys are equal when their key values are equal position by
/// position. The keys themselves may differ: a key over a parent record's
/// `id` can probe a map built with a key over the child record's `parent_id`.
/// Nulls are always equal to each other here so that `Eq` stays reflexive.
#[derive(Debug, Clone)]
pub struct HashKey {
    key: Arc<RecordKey>,
    record: Arc<DataRecord>,
}

impl HashKey {
    /// Pairs `key` with `record`.
    ///
    /// Fails with [`Error::InvalidArgument`](crate::Error::InvalidArgument)
    /// if `record` does not have the metadata `key` was built for.
    pub fn new(key: Arc<RecordKey>, record: Arc<DataRecord>) -> Result<Self> {
        key.check_record(&record)?;
        Ok(Self { key, record })
    }

    /// The key definition.
    pub fn key(&self) -> &Arc<RecordKey> {
        &self.key
    }

    /// The record.
    pub fn record(&self) -> &Arc<DataRecord> {
        &self.record
    }

    fn values(&self) -> impl Iterator<Item = &Value> {
        self.key.values(&self.record)
    }
}

impl PartialEq for HashKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.len() == other.key.len() && self.values().eq(other.values())
    }
}

impl Eq for HashKey {}

impl Hash for HashKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash_record(&self.record, state);
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.key.key_string(&self.record))
    }
}
