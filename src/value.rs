//! Decoded value tree
//!
//! Built by the decoders, then immutable and owned by the caller. Scalars
//! own their content, so the input buffer can be dropped independently.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Byte(u8),
    SByte(i8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl Scalar {
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Scalar::Byte(v) => *v as i128,
            Scalar::SByte(v) => *v as i128,
            Scalar::Short(v) => *v as i128,
            Scalar::UShort(v) => *v as i128,
            Scalar::Int(v) => *v as i128,
            Scalar::UInt(v) => *v as i128,
            Scalar::Long(v) => *v as i128,
            Scalar::ULong(v) => *v as i128,
            _ => return None,
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v as f64),
            Scalar::Double(v) => Some(*v),
            Scalar::Text(_) => None,
            other => other.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Scalar::Text(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Byte(_) => "byte",
            Scalar::SByte(_) => "sbyte",
            Scalar::Short(_) => "short",
            Scalar::UShort(_) => "ushort",
            Scalar::Int(_) => "int",
            Scalar::UInt(_) => "uint",
            Scalar::Long(_) => "long",
            Scalar::ULong(_) => "ulong",
            Scalar::Float(_) => "float",
            Scalar::Double(_) => "double",
            Scalar::Text(_) => "text",
        }
    }

    /// Numeric comparison across widths; integers compare exactly
    pub fn compare_numeric(&self, other_int: Option<i128>, other_float: Option<f64>) -> Option<Ordering> {
        match (self.as_i128(), other_int) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => {
                let a = self.as_f64()?;
                let b = other_float.or_else(|| other_int.map(|i| i as f64))?;
                a.partial_cmp(&b)
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Double(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
            other => match other.as_i128() {
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            },
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Byte(v) => serializer.serialize_u8(*v),
            Scalar::SByte(v) => serializer.serialize_i8(*v),
            Scalar::Short(v) => serializer.serialize_i16(*v),
            Scalar::UShort(v) => serializer.serialize_u16(*v),
            Scalar::Int(v) => serializer.serialize_i32(*v),
            Scalar::UInt(v) => serializer.serialize_u32(*v),
            Scalar::Long(v) => serializer.serialize_i64(*v),
            Scalar::ULong(v) => serializer.serialize_u64(*v),
            Scalar::Float(v) => serializer.serialize_f32(*v),
            Scalar::Double(v) => serializer.serialize_f64(*v),
            Scalar::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Ordered field mapping produced for one schema
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Concrete schema name, e.g. `LengthPrefixed<Item>` or `Packet.Header`
    pub schema: String,
    pub fields: Vec<(String, DecodedValue)>,
}

impl Record {
    pub fn new(schema: impl Into<String>, fields: Vec<(String, DecodedValue)>) -> Self {
        Self {
            schema: schema.into(),
            fields,
        }
    }

    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Result of decoding a type expression
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Scalar(Scalar),
    Record(Record),
    Array(Vec<DecodedValue>),
}

impl DecodedValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            DecodedValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            DecodedValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DecodedValue]> {
        match self {
            DecodedValue::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        self.as_scalar().and_then(Scalar::as_i128)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    /// Field of a record value
    pub fn field(&self, name: &str) -> Option<&DecodedValue> {
        self.as_record().and_then(|r| r.get(name))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DecodedValue::Scalar(s) => s.type_name(),
            DecodedValue::Record(_) => "record",
            DecodedValue::Array(_) => "array",
        }
    }
}

impl Serialize for DecodedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DecodedValue::Scalar(s) => s.serialize(serializer),
            DecodedValue::Record(r) => r.serialize(serializer),
            DecodedValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<Scalar> for DecodedValue {
    fn from(s: Scalar) -> Self {
        DecodedValue::Scalar(s)
    }
}

impl From<Record> for DecodedValue {
    fn from(r: Record) -> Self {
        DecodedValue::Record(r)
    }
}
