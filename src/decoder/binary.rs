//! Binary decoder
//!
//! Reads fixed-width primitives and byte strings from a borrowed buffer.
//! The returned tree owns its values; the buffer is not retained.

use crate::ast::{Endianness, Primitive, PrimitiveKind, SchemaDefinition, SchemaKind, StringEncoding};
use crate::config::DecoderOptions;
use crate::error::{DecodeError, SchemaError};
use crate::registry::SchemaRegistry;
use crate::value::{Record, Scalar};

use super::{DecodeInput, Decoder, ReadError};

/// Byte cursor
#[derive(Debug, Clone)]
pub struct BinaryInput<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> BinaryInput<'b> {
    pub fn new(buf: &'b [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8], ReadError> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(ReadError::OutOfBounds(format!(
                "need {} byte(s), {} remaining",
                n, remaining
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

macro_rules! read_number {
    ($input:expr, $ty:ty, $variant:ident, $endian:expr) => {{
        let bytes = $input.take_array::<{ std::mem::size_of::<$ty>() }>()?;
        Scalar::$variant(match $endian {
            Endianness::Little => <$ty>::from_le_bytes(bytes),
            Endianness::Big => <$ty>::from_be_bytes(bytes),
        })
    }};
}

impl DecodeInput for BinaryInput<'_> {
    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_primitive(&mut self, p: Primitive, default: Endianness) -> Result<Scalar, ReadError> {
        let endian = p.endianness.unwrap_or(default);
        Ok(match p.kind {
            PrimitiveKind::Byte => read_number!(self, u8, Byte, endian),
            PrimitiveKind::SByte => read_number!(self, i8, SByte, endian),
            PrimitiveKind::Short => read_number!(self, i16, Short, endian),
            PrimitiveKind::UShort => read_number!(self, u16, UShort, endian),
            PrimitiveKind::Int => read_number!(self, i32, Int, endian),
            PrimitiveKind::UInt => read_number!(self, u32, UInt, endian),
            PrimitiveKind::Long => read_number!(self, i64, Long, endian),
            PrimitiveKind::ULong => read_number!(self, u64, ULong, endian),
            PrimitiveKind::Float => read_number!(self, f32, Float, endian),
            PrimitiveKind::Double => read_number!(self, f64, Double, endian),
        })
    }

    /// Fixed-width field; trailing NUL padding is dropped
    fn read_string(&mut self, len: usize, encoding: StringEncoding) -> Result<String, ReadError> {
        let bytes = self.take(len)?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let bytes = &bytes[..end];

        if encoding == StringEncoding::Ascii {
            if let Some(i) = bytes.iter().position(|b| !b.is_ascii()) {
                return Err(ReadError::InvalidText(format!(
                    "byte 0x{:02X} at position {} is not ASCII",
                    bytes[i], i
                )));
            }
        }
        String::from_utf8(bytes.to_vec()).map_err(|e| ReadError::InvalidText(e.to_string()))
    }
}

/// Decode a byte buffer against a resolved binary schema
pub fn decode_binary(
    registry: &SchemaRegistry,
    options: &DecoderOptions,
    schema: &SchemaDefinition,
    buf: &[u8],
) -> Result<Record, DecodeError> {
    if schema.kind != SchemaKind::Binary {
        return Err(SchemaError::TypeMismatch {
            schema: schema.name.clone(),
            field: "<entry>".to_string(),
            reason: format!("{} schema cannot decode binary input", schema.kind),
        }
        .into());
    }
    Decoder::new(registry, options, BinaryInput::new(buf)).decode_root(schema)
}
