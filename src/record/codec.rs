//! Binary field encoding.
//!
//! Fixed-length types are written big-endian with an in-band null value.
//! Variable-length types carry a length prefix encoded by [`encode_length`],
//! where `0` marks null and any other value is the real length plus one.
//!
//! ```text
//! Boolean  [u8: 0 | 1 | 2=null]
//! Integer  [i32 BE]  i32::MIN = null
//! Long     [i64 BE]  i64::MIN = null
//! Date     [i64 BE]  i64::MIN = null
//! Number   [f64 BE]  NaN = null
//! String   [varint len+1][len x u16 BE UTF-16 code units]
//! Bytes    [varint len+1][len bytes]
//! ```

use super::Value;
use crate::error::{Error, Result};
use crate::intern::InternPool;
use crate::metadata::FieldType;
use bytes::{Buf, BufMut, Bytes};
use std::sync::Arc;

/// Maximum number of bytes a length prefix can occupy.
pub const MAX_LENGTH_BYTES: usize = 5;

const CONTINUATION_BIT: u8 = 0x80;
const BOOLEAN_NULL: u8 = 2;

/// Writes `length` as 7-bit groups, lowest group first.
///
/// Returns the number of bytes written.
pub fn encode_length(buf: &mut impl BufMut, mut length: u32) -> usize {
    let mut written = 1;
    while length > 0x7F {
        buf.put_u8(CONTINUATION_BIT | (length as u8 & 0x7F));
        length >>= 7;
        written += 1;
    }
    buf.put_u8(length as u8);
    written
}

/// Reads a length written by [`encode_length`].
pub fn decode_length(buf: &mut impl Buf) -> Result<u32> {
    let mut length: u32 = 0;
    for i in 0..MAX_LENGTH_BYTES {
        if !buf.has_remaining() {
            return Err(Error::corruption("Truncated length prefix"));
        }
        let byte = buf.get_u8();
        length |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & CONTINUATION_BIT == 0 {
            return Ok(length);
        }
    }
    Err(Error::corruption("Length prefix longer than 5 bytes"))
}

/// Number of bytes [`encode_length`] needs for `length`.
pub fn length_encoded(length: u32) -> usize {
    match length {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}

fn ensure(buf: &impl Buf, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::corruption(format!(
            "Truncated {} field: need {} bytes, {} left",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Serialize one value of `field_type`.
///
/// The caller guarantees `value` matches `field_type` or is `Null`.
pub fn write_value(buf: &mut impl BufMut, field_type: FieldType, value: &Value) {
    match (field_type, value) {
        (FieldType::Boolean, Value::Boolean(b)) => buf.put_u8(*b as u8),
        (FieldType::Boolean, _) => buf.put_u8(BOOLEAN_NULL),
        (FieldType::Integer, Value::Integer(v)) => buf.put_i32(*v),
        (FieldType::Integer, _) => buf.put_i32(i32::MIN),
        (FieldType::Long, Value::Long(v)) | (FieldType::Date, Value::Date(v)) => buf.put_i64(*v),
        (FieldType::Long, _) | (FieldType::Date, _) => buf.put_i64(i64::MIN),
        (FieldType::Number, Value::Number(v)) => buf.put_f64(*v),
        (FieldType::Number, _) => buf.put_f64(f64::NAN),
        (FieldType::String, Value::String(s)) => {
            let units = s.encode_utf16().count() as u32;
            encode_length(buf, units + 1);
            for unit in s.encode_utf16() {
                buf.put_u16(unit);
            }
        }
        (FieldType::Bytes, Value::Bytes(b)) => {
            encode_length(buf, b.len() as u32 + 1);
            buf.put_slice(b);
        }
        (FieldType::String, _) | (FieldType::Bytes, _) => {
            encode_length(buf, 0);
        }
    }
}

/// Serialized size of one value of `field_type`.
pub fn value_size(field_type: FieldType, value: &Value) -> usize {
    if let Some(size) = field_type.fixed_size() {
        return size;
    }
    match value {
        Value::String(s) => {
            let units = s.encode_utf16().count();
            length_encoded(units as u32 + 1) + units * 2
        }
        Value::Bytes(b) => length_encoded(b.len() as u32 + 1) + b.len(),
        _ => length_encoded(0),
    }
}

/// Deserialize one value of `field_type`, interning strings through `pool`.
pub fn read_value(
    buf: &mut impl Buf,
    field_type: FieldType,
    pool: Option<&InternPool>,
) -> Result<Value> {
    let value = match field_type {
        FieldType::Boolean => {
            ensure(buf, 1, "boolean")?;
            match buf.get_u8() {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                BOOLEAN_NULL => Value::Null,
                other => return Err(Error::corruption(format!("Invalid boolean byte {}", other))),
            }
        }
        FieldType::Integer => {
            ensure(buf, 4, "integer")?;
            match buf.get_i32() {
                i32::MIN => Value::Null,
                v => Value::Integer(v),
            }
        }
        FieldType::Long => {
            ensure(buf, 8, "long")?;
            match buf.get_i64() {
                i64::MIN => Value::Null,
                v => Value::Long(v),
            }
        }
        FieldType::Date => {
            ensure(buf, 8, "date")?;
            match buf.get_i64() {
                i64::MIN => Value::Null,
                v => Value::Date(v),
            }
        }
        FieldType::Number => {
            ensure(buf, 8, "number")?;
            let v = buf.get_f64();
            if v.is_nan() {
                Value::Null
            } else {
                Value::Number(v)
            }
        }
        FieldType::String => match decode_length(buf)? {
            0 => Value::Null,
            encoded => {
                let units = (encoded - 1) as usize;
                ensure(buf, units * 2, "string")?;
                let mut utf16 = Vec::with_capacity(units);
                for _ in 0..units {
                    utf16.push(buf.get_u16());
                }
                let s = String::from_utf16(&utf16)
                    .map_err(|e| Error::corruption(format!("Invalid UTF-16 string: {}", e)))?;
                match pool {
                    Some(pool) => Value::String(pool.intern(&s)),
                    None => Value::String(Arc::from(s)),
                }
            }
        },
        FieldType::Bytes => match decode_length(buf)? {
            0 => Value::Null,
            encoded => {
                let len = (encoded - 1) as usize;
                ensure(buf, len, "bytes")?;
                Value::Bytes(buf.copy_to_bytes(len))
            }
        },
    };
    Ok(value)
}

/// Convenience for decoding a value from a byte slice.
pub fn read_value_from(data: &[u8], field_type: FieldType) -> Result<Value> {
    let mut bytes = Bytes::copy_from_slice(data);
    read_value(&mut bytes, field_type, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    #[test]
    fn test_length_encoding_boundaries() {
        for (length, expected_bytes) in
            [(0u32, 1usize), (127, 1), (128, 2), (16383, 2), (16384, 3), (u32::MAX, 5)]
        {
            let mut buf = BytesMut::new();
            assert_eq!(encode_length(&mut buf, length), expected_bytes);
            assert_eq!(length_encoded(length), expected_bytes);
            let mut frozen = buf.freeze();
            assert_eq!(decode_length(&mut frozen).unwrap(), length);
            assert!(!frozen.has_remaining());
        }
    }

    #[test]
    fn test_length_encoding_layout() {
        // 300 = 0b10_0101100 -> low group first with continuation bit
        let mut buf = BytesMut::new();
        encode_length(&mut buf, 300);
        assert_eq!(&buf[..], &[0xAC, 0x02]);
    }

    #[test]
    fn test_truncated_length() {
        let mut buf = Bytes::from_static(&[0x80]);
        assert!(matches!(decode_length(&mut buf), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_string_layout() {
        let mut buf = BytesMut::new();
        write_value(&mut buf, FieldType::String, &Value::from("ab"));
        assert_eq!(&buf[..], &[3, 0, b'a', 0, b'b']);
        assert_eq!(value_size(FieldType::String, &Value::from("ab")), 5);
    }

    #[test]
    fn test_null_encodings() {
        for field_type in [
            FieldType::Boolean,
            FieldType::Integer,
            FieldType::Long,
            FieldType::Date,
            FieldType::Number,
            FieldType::String,
            FieldType::Bytes,
        ] {
            let mut buf = BytesMut::new();
            write_value(&mut buf, field_type, &Value::Null);
            assert_eq!(buf.len(), value_size(field_type, &Value::Null));
            assert_eq!(read_value_from(&buf, field_type).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_truncated_fixed_field() {
        let err = read_value_from(&[0, 0, 1], FieldType::Integer).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_strings_are_interned() {
        let pool = InternPool::new(8, crate::intern::EvictionPolicy::Lru);
        let mut buf = BytesMut::new();
        write_value(&mut buf, FieldType::String, &Value::from("city"));
        write_value(&mut buf, FieldType::String, &Value::from("city"));
        let mut frozen = buf.freeze();

        let a = read_value(&mut frozen, FieldType::String, Some(&pool)).unwrap();
        let b = read_value(&mut frozen, FieldType::String, Some(&pool)).unwrap();
        match (a, b) {
            (Value::String(a), Value::String(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("Expected strings"),
        }
    }

    proptest! {
        #[test]
        fn prop_length_decodes_to_itself(length in any::<u32>()) {
            let mut buf = BytesMut::new();
            let written = encode_length(&mut buf, length);
            prop_assert_eq!(written, length_encoded(length));
            let mut frozen = buf.freeze();
            prop_assert_eq!(decode_length(&mut frozen).unwrap(), length);
        }

        #[test]
        fn prop_string_size_matches_encoding(s in "\\PC{0,64}") {
            let value = Value::from(s.as_str());
            let mut buf = BytesMut::new();
            write_value(&mut buf, FieldType::String, &value);
            prop_assert_eq!(buf.len(), value_size(FieldType::String, &value));
            prop_assert_eq!(read_value_from(&buf, FieldType::String).unwrap(), value);
        }
    }
}
