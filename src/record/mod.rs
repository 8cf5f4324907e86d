//! Typed data records and their binary serialization.
//!
//! A [`DataRecord`] is a list of [`Value`]s laid out by a shared
//! [`RecordMetadata`]. Records serialize field after field with the encoding
//! documented in [`codec`]; the serialized bytes are what tapes and buffers
//! store as opaque payloads.

pub mod codec;

use crate::error::{Error, Result};
use crate::intern::InternPool;
use crate::metadata::{FieldType, RecordMetadata};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A single field value.
///
/// `Integer(i32::MIN)`, `Long(i64::MIN)`, `Date(i64::MIN)` and `Number(NaN)`
/// share their encoding with null. [`DataRecord::set`] stores them as
/// [`Value::Null`].
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value of any type.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer value.
    Integer(i32),
    /// 64-bit integer value.
    Long(i64),
    /// Floating point value.
    Number(f64),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// String value, possibly shared through an intern pool.
    String(Arc<str>),
    /// Byte array value.
    Bytes(Bytes),
}

impl Value {
    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Maps the values that encode as null to [`Value::Null`].
    pub fn normalized(self) -> Self {
        match self {
            Value::Integer(i32::MIN) | Value::Long(i64::MIN) | Value::Date(i64::MIN) => Value::Null,
            Value::Number(v) if v.is_nan() => Value::Null,
            other => other,
        }
    }

    /// Returns true if the value may be stored in a field of `field_type`.
    pub fn fits(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Value::Null, _)
                | (Value::Boolean(_), FieldType::Boolean)
                | (Value::Integer(_), FieldType::Integer)
                | (Value::Long(_), FieldType::Long)
                | (Value::Number(_), FieldType::Number)
                | (Value::Date(_), FieldType::Date)
                | (Value::String(_), FieldType::String)
                | (Value::Bytes(_), FieldType::Bytes)
        )
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Long(_) => 3,
            Value::Number(_) => 4,
            Value::Date(_) => 5,
            Value::String(_) => 6,
            Value::Bytes(_) => 7,
        }
    }

    /// Natural ordering of two values. Null sorts before everything else.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Long(a), Value::Long(b)) | (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Returns the value as `i64` for integer-like values.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v as i64),
            Value::Long(v) | Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `&str` for strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Long(a), Value::Long(b)) | (Value::Date(a), Value::Date(b)) => a == b,
            // Bit equality keeps Eq and Hash consistent.
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Integer(v) => v.hash(state),
            Value::Long(v) | Value::Date(v) => v.hash(state),
            Value::Number(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Long(v) | Value::Date(v) => write!(f, "{}", v),
            Value::Number(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

/// A record: one value per field of its metadata.
#[derive(Debug, Clone)]
pub struct DataRecord {
    metadata: Arc<RecordMetadata>,
    values: Vec<Value>,
}

impl DataRecord {
    /// Creates a record with every field null.
    pub fn new(metadata: Arc<RecordMetadata>) -> Self {
        let values = vec![Value::Null; metadata.num_fields()];
        Self { metadata, values }
    }

    /// Creates a record from a full list of values.
    pub fn from_values(metadata: Arc<RecordMetadata>, values: Vec<Value>) -> Result<Self> {
        if values.len() != metadata.num_fields() {
            return Err(Error::invalid_argument(format!(
                "Record '{}' has {} fields, got {} values",
                metadata.name(),
                metadata.num_fields(),
                values.len()
            )));
        }
        let mut record = Self::new(metadata);
        for (index, value) in values.into_iter().enumerate() {
            record.set(index, value)?;
        }
        Ok(record)
    }

    /// Returns the record metadata.
    pub fn metadata(&self) -> &Arc<RecordMetadata> {
        &self.metadata
    }

    /// Returns the number of fields.
    pub fn num_fields(&self) -> usize {
        self.values.len()
    }

    /// Returns the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a field position of the metadata.
    pub fn get(&self, index: usize) -> &Value {
        &self.values[index]
    }

    /// Returns the value of the field called `name`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.metadata.field_position(name).map(|i| &self.values[i])
    }

    /// Returns all values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Sets the value at `index`, checking it against the field type.
    ///
    /// Null sentinels such as `i32::MIN` or NaN are stored as null.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into().normalized();
        let field = self.metadata.field(index).ok_or_else(|| {
            Error::invalid_argument(format!(
                "Field index {} out of bounds for record '{}'",
                index,
                self.metadata.name()
            ))
        })?;
        if !value.fits(field.field_type) {
            return Err(Error::invalid_argument(format!(
                "Value {} does not fit field '{}' of type {:?}",
                value, field.name, field.field_type
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    /// Makes every field null.
    pub fn reset(&mut self) {
        for value in &mut self.values {
            *value = Value::Null;
        }
    }

    /// Copies the values of `other`, which must share the field layout.
    pub fn copy_from(&mut self, other: &DataRecord) {
        self.values.clone_from(&other.values);
    }

    /// Serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        self.metadata
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(field, value)| codec::value_size(field.field_type, value))
            .sum()
    }

    /// Appends the serialized fields to `buf`.
    pub fn serialize(&self, buf: &mut impl BufMut) {
        for (field, value) in self.metadata.fields().iter().zip(&self.values) {
            codec::write_value(buf, field.field_type, value);
        }
    }

    /// Serializes the record into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_size());
        self.serialize(&mut buf);
        buf.freeze()
    }

    /// Reads every field from `buf`, replacing the current values.
    pub fn deserialize(&mut self, buf: &mut impl Buf) -> Result<()> {
        RecordDeserializer::new().deserialize(self, buf)
    }
}

impl PartialEq for DataRecord {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.metadata, &other.metadata) || self.metadata == other.metadata)
            && self.values == other.values
    }
}

impl fmt::Display for DataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.metadata.name())?;
        for (i, (field, value)) in self.metadata.fields().iter().zip(&self.values).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", field.name, value)?;
        }
        write!(f, "]")
    }
}

/// Deserializes records, optionally interning string values.
#[derive(Debug, Clone, Default)]
pub struct RecordDeserializer {
    pool: Option<Arc<InternPool>>,
}

impl RecordDeserializer {
    /// Deserializer without interning.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserializer interning every decoded string through `pool`.
    pub fn with_pool(pool: Arc<InternPool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// Reads every field of `record` from `buf`.
    pub fn deserialize(&self, record: &mut DataRecord, buf: &mut impl Buf) -> Result<()> {
        let pool = self.pool.as_deref();
        for (index, field) in record.metadata.fields().iter().enumerate() {
            record.values[index] = codec::read_value(buf, field.field_type, pool)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::EvictionPolicy;
    use std::collections::hash_map::DefaultHasher;

    fn metadata() -> Arc<RecordMetadata> {
        Arc::new(
            RecordMetadata::new("person")
                .with_field("id", FieldType::Long)
                .with_field("name", FieldType::String)
                .with_field("score", FieldType::Number)
                .with_field("active", FieldType::Boolean)
                .with_field("age", FieldType::Integer)
                .with_field("born", FieldType::Date)
                .with_field("photo", FieldType::Bytes),
        )
    }

    fn sample(md: &Arc<RecordMetadata>) -> DataRecord {
        DataRecord::from_values(
            md.clone(),
            vec![
                Value::Long(7),
                Value::from("Žofie"),
                Value::Number(12.5),
                Value::Boolean(true),
                Value::Integer(41),
                Value::Date(1_600_000_000_000),
                Value::from(vec![1u8, 2, 3]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_serialize_deserialize() {
        let md = metadata();
        let record = sample(&md);
        let mut bytes = record.to_bytes();
        assert_eq!(bytes.len(), record.serialized_size());

        let mut copy = DataRecord::new(md);
        copy.deserialize(&mut bytes).unwrap();
        assert_eq!(copy, record);
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn test_nulls_survive_serialization() {
        let md = metadata();
        let record = DataRecord::new(md.clone());
        let mut bytes = record.to_bytes();
        let mut copy = sample(&md);
        copy.deserialize(&mut bytes).unwrap();
        assert!(copy.values().iter().all(Value::is_null));
    }

    #[test]
    fn test_null_sentinels_stored_as_null() {
        let md = metadata();
        let mut record = sample(&md);
        record.set(0, Value::Long(i64::MIN)).unwrap();
        record.set(2, f64::NAN).unwrap();
        record.set(4, i32::MIN).unwrap();
        record.set(5, Value::Date(i64::MIN)).unwrap();
        for index in [0, 2, 4, 5] {
            assert!(record.get(index).is_null(), "field {}", index);
        }

        let mut bytes = record.to_bytes();
        let mut copy = sample(&md);
        copy.deserialize(&mut bytes).unwrap();
        assert_eq!(copy, record);
    }

    #[test]
    fn test_set_checks_type() {
        let md = metadata();
        let mut record = DataRecord::new(md);
        assert!(record.set(0, 5i64).is_ok());
        assert!(record.set(0, "text").is_err());
        assert!(record.set(99, 5i64).is_err());
        assert_eq!(record.field("id"), Some(&Value::Long(5)));
    }

    #[test]
    fn test_from_values_checks_arity() {
        let md = metadata();
        let err = DataRecord::from_values(md, vec![Value::Null]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_truncated_record() {
        let md = metadata();
        let bytes = sample(&md).to_bytes();
        let mut truncated = bytes.slice(..bytes.len() - 2);
        let mut copy = DataRecord::new(md);
        assert!(matches!(copy.deserialize(&mut truncated), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_value_ordering() {
        assert_eq!(Value::Null.compare(&Value::Long(i64::MIN + 1)), Ordering::Less);
        assert_eq!(Value::Long(3).compare(&Value::Long(2)), Ordering::Greater);
        assert_eq!(Value::from("a").compare(&Value::from("b")), Ordering::Less);
        assert_eq!(Value::Number(-0.0).compare(&Value::Number(0.0)), Ordering::Less);
    }

    #[test]
    fn test_value_hash_consistent_with_eq() {
        let hash = |v: &Value| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        assert_eq!(Value::Number(1.5), Value::Number(1.5));
        assert_eq!(hash(&Value::Number(1.5)), hash(&Value::Number(1.5)));
        assert_ne!(Value::Long(1), Value::Date(1));
        assert_eq!(hash(&Value::from("x")), hash(&Value::from(String::from("x"))));
    }

    #[test]
    fn test_deserializer_with_pool() {
        let md = metadata();
        let pool = Arc::new(InternPool::new(16, EvictionPolicy::Lru));
        let deserializer = RecordDeserializer::with_pool(pool.clone());

        let record = sample(&md);
        let mut a = DataRecord::new(md.clone());
        let mut b = DataRecord::new(md);
        deserializer.deserialize(&mut a, &mut record.to_bytes()).unwrap();
        deserializer.deserialize(&mut b, &mut record.to_bytes()).unwrap();

        assert!(pool.contains("Žofie"));
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display() {
        let md = Arc::new(RecordMetadata::new("r").with_field("x", FieldType::Integer));
        let record = DataRecord::from_values(md, vec![Value::Integer(3)]).unwrap();
        assert_eq!(record.to_string(), "r[x=3]");
    }
}
