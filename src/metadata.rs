//! Record metadata: the schema descriptor shared by records, keys and sorters.
//!
//! Metadata is immutable once built and is shared between records through an
//! `Arc`. It can be built in code or loaded from JSON:
//!
//! ```rust
//! use recordtape::metadata::{FieldType, RecordMetadata};
//!
//! let md = RecordMetadata::new("customer")
//!     .with_field("id", FieldType::Long)
//!     .with_field("name", FieldType::String);
//! assert_eq!(md.field_position("name"), Some(1));
//!
//! let json = r#"{"name":"customer","fields":[{"name":"id","type":"long"}]}"#;
//! let md = RecordMetadata::from_json(json).unwrap();
//! assert_eq!(md.num_fields(), 1);
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// The data type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// `true`/`false`.
    Boolean,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 64-bit IEEE-754 floating point.
    Number,
    /// Milliseconds since the Unix epoch.
    Date,
    /// Unicode string.
    String,
    /// Raw byte array.
    Bytes,
}

impl FieldType {
    /// Serialized size for fixed-length types, `None` for variable-length ones.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            FieldType::Boolean => Some(1),
            FieldType::Integer => Some(4),
            FieldType::Long | FieldType::Date | FieldType::Number => Some(8),
            FieldType::String | FieldType::Bytes => None,
        }
    }
}

/// Description of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Field name, unique within a record.
    pub name: String,
    /// Field data type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Ordered list of fields describing one record layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    name: String,
    fields: Vec<FieldMetadata>,
}

impl RecordMetadata {
    /// Creates metadata with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new() }
    }

    /// Appends a field.
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldMetadata { name: name.into(), field_type });
        self
    }

    /// Parses metadata from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the metadata name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Returns all fields in order.
    pub fn fields(&self) -> &[FieldMetadata] {
        &self.fields
    }

    /// Returns the field at `index`.
    pub fn field(&self, index: usize) -> Option<&FieldMetadata> {
        self.fields.get(index)
    }

    /// Returns the position of the field called `name`.
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}
