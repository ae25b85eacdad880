//! Text decoder
//!
//! Delimiter scanning over one input unit (typically a line). The cursor is
//! kept as a byte index into the `&str` so slicing stays on char
//! boundaries; offsets reported in errors are character offsets.
//!
//! With `escaped`, a backslash makes the following character literal: it
//! never terminates a scan, and both characters are kept verbatim in the
//! captured content.

use crate::ast::{SchemaDefinition, SchemaKind};
use crate::config::DecoderOptions;
use crate::error::{DecodeError, SchemaError};
use crate::registry::SchemaRegistry;
use crate::value::Record;

use super::{DecodeInput, Decoder, ReadError};

const ESCAPE: char = '\\';

/// Character cursor
#[derive(Debug, Clone)]
pub struct TextInput<'t> {
    text: &'t str,
    /// Byte index of the cursor
    pos: usize,
    /// Character index of the cursor
    chars: usize,
}

impl<'t> TextInput<'t> {
    pub fn new(text: &'t str) -> Self {
        Self {
            text,
            pos: 0,
            chars: 0,
        }
    }

    fn rest(&self) -> &'t str {
        &self.text[self.pos..]
    }

    fn advance(&mut self, bytes: usize) {
        self.chars += self.text[self.pos..self.pos + bytes].chars().count();
        self.pos += bytes;
    }
}

/// Byte length of the char starting at `i`
fn char_len(s: &str, i: usize) -> usize {
    s[i..].chars().next().map_or(1, char::len_utf8)
}

/// Byte index of the first unescaped `needle` in `hay`
fn find_unescaped(hay: &str, needle: &str, escaped: bool) -> Option<usize> {
    let mut i = 0;
    while i < hay.len() {
        let rest = &hay[i..];
        if escaped && rest.starts_with(ESCAPE) {
            i += ESCAPE.len_utf8();
            if i < hay.len() {
                i += char_len(hay, i);
            }
            continue;
        }
        if rest.starts_with(needle) {
            return Some(i);
        }
        i += char_len(hay, i);
    }
    None
}

/// Byte index of the `close` matching an already consumed `open`
///
/// Nesting is only tracked when the two delimiters differ.
fn find_closing(body: &str, open: &str, close: &str, escaped: bool) -> Option<usize> {
    let nested = open != close;
    let mut depth = 0usize;
    let mut i = 0;

    while i < body.len() {
        let rest = &body[i..];
        if escaped && rest.starts_with(ESCAPE) {
            i += ESCAPE.len_utf8();
            if i < body.len() {
                i += char_len(body, i);
            }
            continue;
        }
        if rest.starts_with(close) {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
            i += close.len();
            continue;
        }
        if nested && rest.starts_with(open) {
            depth += 1;
            i += open.len();
            continue;
        }
        i += char_len(body, i);
    }
    None
}

impl DecodeInput for TextInput<'_> {
    fn position(&self) -> usize {
        self.chars
    }

    fn remaining(&self) -> usize {
        self.rest().chars().count()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn read_until(&mut self, delimiter: &str, escaped: bool) -> Result<String, ReadError> {
        let rest = self.rest();
        let Some(at) = find_unescaped(rest, delimiter, escaped) else {
            return Err(ReadError::OutOfBounds(format!(
                "delimiter '{}' not found",
                delimiter.escape_debug()
            )));
        };
        let captured = rest[..at].to_string();
        self.advance(at + delimiter.len());
        Ok(captured)
    }

    fn read_between(&mut self, open: &str, close: &str, escaped: bool) -> Result<String, ReadError> {
        let rest = self.rest();
        if !rest.starts_with(open) {
            return Err(ReadError::Unexpected(open.to_string()));
        }
        let body = &rest[open.len()..];
        let Some(at) = find_closing(body, open, close, escaped) else {
            return Err(ReadError::OutOfBounds(format!(
                "closing '{}' not found",
                close.escape_debug()
            )));
        };
        let captured = body[..at].to_string();
        self.advance(open.len() + at + close.len());
        Ok(captured)
    }

    fn read_rest(&mut self) -> Result<String, ReadError> {
        let captured = self.rest().to_string();
        self.advance(captured.len());
        Ok(captured)
    }
}

/// Decode one text unit against a resolved text schema
pub fn decode_text(
    registry: &SchemaRegistry,
    options: &DecoderOptions,
    schema: &SchemaDefinition,
    unit: &str,
) -> Result<Record, DecodeError> {
    if schema.kind != SchemaKind::Text {
        return Err(SchemaError::TypeMismatch {
            schema: schema.name.clone(),
            field: "<entry>".to_string(),
            reason: format!("{} schema cannot decode text input", schema.kind),
        }
        .into());
    }
    Decoder::new(registry, options, TextInput::new(unit)).decode_root(schema)
}
