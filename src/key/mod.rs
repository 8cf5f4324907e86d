//! Record keys: comparison and hash identity over a subset of fields.
//!
//! A [`RecordKey`] resolves field names to positions once, at construction.
//! A [`HashKey`] pairs a key with a record so the pair can be used as a hash
//! map key; equality and hashing look at the key fields only.

mod grouping;
mod hash_key;

pub use grouping::{PortDefinition, TreeRecord};
pub use hash_key::HashKey;

use crate::error::{Error, Result};
use crate::metadata::RecordMetadata;
use crate::record::{DataRecord, Value};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Sort direction of a key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

impl Order {
    fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "a" | "A" | "asc" => Some(Order::Ascending),
            "d" | "D" | "desc" => Some(Order::Descending),
            _ => None,
        }
    }
}

/// A key field resolved against record metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    /// Field name
    pub name: String,
    /// Position of the field in the record
    pub position: usize,
    /// Sort direction
    pub order: Order,
}

/// Identity of a record given by some of its fields.
#[derive(Debug, Clone)]
pub struct RecordKey {
    fields: Vec<KeyField>,
    metadata: Arc<RecordMetadata>,
    equal_nulls: bool,
}

impl RecordKey {
    /// Builds an ascending key over `names`.
    ///
    /// Fails with [`Error::Configuration`] naming every field that `metadata`
    /// does not contain.
    pub fn new(names: &[&str], metadata: Arc<RecordMetadata>) -> Result<Self> {
        let wanted: Vec<(&str, Order)> = names.iter().map(|name| (*name, Order::Ascending)).collect();
        Self::resolve(&wanted, metadata)
    }

    /// Parses a key definition such as `"last(a);first(d)"`.
    ///
    /// Fields are separated by `;` or `,`. An optional `(a)` or `(d)` suffix
    /// picks the direction; ascending is the default.
    pub fn parse(definition: &str, metadata: Arc<RecordMetadata>) -> Result<Self> {
        let mut wanted = Vec::new();
        for part in definition.split([';', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            let (name, order) = match part.find('(') {
                Some(open) => {
                    let token = part[open + 1..].strip_suffix(')').ok_or_else(|| {
                        Error::configuration(format!("Unterminated ordering in key field '{}'", part))
                    })?;
                    let order = Order::from_token(token).ok_or_else(|| {
                        Error::configuration(format!("Unknown ordering '{}' in key field '{}'", token, part))
                    })?;
                    (part[..open].trim(), order)
                }
                None => (part, Order::Ascending),
            };
            wanted.push((name, order));
        }
        Self::resolve(&wanted, metadata)
    }

    fn resolve(wanted: &[(&str, Order)], metadata: Arc<RecordMetadata>) -> Result<Self> {
        if wanted.is_empty() {
            return Err(Error::configuration(format!(
                "Key over record '{}' has no fields",
                metadata.name()
            )));
        }
        let mut fields = Vec::with_capacity(wanted.len());
        let mut missing = Vec::new();
        for (name, order) in wanted {
            match metadata.field_position(name) {
                Some(position) => fields.push(KeyField { name: name.to_string(), position, order: *order }),
                None => missing.push(*name),
            }
        }
        if !missing.is_empty() {
            return Err(Error::configuration(format!(
                "Key field(s) {} not found in record '{}'",
                missing.join(", "),
                metadata.name()
            )));
        }
        Ok(Self { fields, metadata, equal_nulls: true })
    }

    /// Whether two nulls count as equal in [`equals`](Self::equals).
    /// Default: true
    pub fn with_equal_nulls(mut self, equal_nulls: bool) -> Self {
        self.equal_nulls = equal_nulls;
        self
    }

    /// Returns the equal-nulls setting.
    pub fn equal_nulls(&self) -> bool {
        self.equal_nulls
    }

    /// Key fields in order.
    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    /// Field positions in key order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields.iter().map(|f| f.position)
    }

    /// Number of key fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false; a key has at least one field.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Metadata the key was resolved against.
    pub fn metadata(&self) -> &Arc<RecordMetadata> {
        &self.metadata
    }

    /// Fails with [`Error::InvalidArgument`] unless `record` is laid out by
    /// the key's metadata.
    pub fn check_record(&self, record: &DataRecord) -> Result<()> {
        if Arc::ptr_eq(record.metadata(), &self.metadata) || record.metadata().as_ref() == self.metadata.as_ref() {
            return Ok(());
        }
        Err(Error::invalid_argument(format!(
            "Key {} is over record '{}', got a '{}' record",
            self,
            self.metadata.name(),
            record.metadata().name()
        )))
    }

    /// Key values of `record` in key order.
    pub fn values<'a>(&'a self, record: &'a DataRecord) -> impl Iterator<Item = &'a Value> + 'a {
        self.fields.iter().map(move |f| record.get(f.position))
    }

    /// Orders two records by the key fields, honoring each field's direction.
    /// Null sorts before every other value.
    pub fn compare(&self, a: &DataRecord, b: &DataRecord) -> Ordering {
        for field in &self.fields {
            let ordering = a.get(field.position).compare(b.get(field.position));
            let ordering = match field.order {
                Order::Ascending => ordering,
                Order::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Returns true if all key values are equal.
    pub fn equals(&self, a: &DataRecord, b: &DataRecord) -> bool {
        self.fields.iter().all(|f| {
            let (x, y) = (a.get(f.position), b.get(f.position));
            match (x.is_null(), y.is_null()) {
                (true, true) => self.equal_nulls,
                _ => x == y,
            }
        })
    }

    /// Feeds the key values of `record` to `state`.
    pub fn hash_record<H: Hasher>(&self, record: &DataRecord, state: &mut H) {
        for value in self.values(record) {
            value.hash(state);
        }
    }

    /// Key values rendered for log and error messages, separated by spaces.
    pub fn key_string(&self, record: &DataRecord) -> String {
        self.values(record).map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            let token = match field.order {
                Order::Ascending => "a",
                Order::Descending => "d",
            };
            write!(f, "{}({})", field.name, token)?;
        }
        Ok(())
    }
}
