//! Decode engine shared by the binary and text decoders
//!
//! The engine walks a resolved type graph against a strictly forward
//! cursor. Everything that differs between bytes and characters lives
//! behind [`DecodeInput`]; arrays, records, references and loop control are
//! implemented once here.
//!
//! Each field is decoded with a [`BindingContext`] whose innermost record
//! frame holds the fields already produced, so counts and conditions only
//! ever see earlier data.

pub mod binary;
pub mod text;

use tracing::trace;

use crate::ast::{
    Endianness, Expression, FieldDefinition, Primitive, SchemaDefinition, StringEncoding,
    Terminator, TypeExpr,
};
use crate::config::DecoderOptions;
use crate::error::DecodeError;
use crate::expr::{evaluate_condition, evaluate_count, BindingContext, EvalError};
use crate::registry::SchemaRegistry;
use crate::value::{DecodedValue, Record, Scalar};

pub use binary::{decode_binary, BinaryInput};
pub use text::{decode_text, TextInput};

/// Failure of a single read, before schema/field context is attached
#[derive(Debug, Clone, PartialEq)]
pub enum ReadError {
    OutOfBounds(String),
    Unexpected(String),
    InvalidText(String),
    Unsupported(String),
}

/// Cursor over one input unit
///
/// Offsets are bytes for binary input and characters for text input.
pub trait DecodeInput {
    fn position(&self) -> usize;

    /// Units left after the cursor
    fn remaining(&self) -> usize;

    fn at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn read_primitive(&mut self, p: Primitive, _default: Endianness) -> Result<Scalar, ReadError> {
        Err(ReadError::Unsupported(format!(
            "primitive '{}' cannot be read from text input",
            p.kind.keyword()
        )))
    }

    fn read_string(&mut self, _len: usize, _encoding: StringEncoding) -> Result<String, ReadError> {
        Err(ReadError::Unsupported(
            "fixed-width string cannot be read from text input".to_string(),
        ))
    }

    fn read_until(&mut self, _delimiter: &str, _escaped: bool) -> Result<String, ReadError> {
        Err(unsupported_capture())
    }

    fn read_between(&mut self, _open: &str, _close: &str, _escaped: bool) -> Result<String, ReadError> {
        Err(unsupported_capture())
    }

    fn read_rest(&mut self) -> Result<String, ReadError> {
        Err(unsupported_capture())
    }
}

fn unsupported_capture() -> ReadError {
    ReadError::Unsupported("text capture cannot be read from binary input".to_string())
}

/// Where in the schema the cursor is
#[derive(Debug, Clone, Copy)]
struct Site<'s> {
    schema: &'s str,
    field: &'s str,
}

pub(crate) struct Decoder<'r, I> {
    registry: &'r SchemaRegistry,
    options: &'r DecoderOptions,
    input: I,
}

impl<'r, I: DecodeInput> Decoder<'r, I> {
    pub(crate) fn new(registry: &'r SchemaRegistry, options: &'r DecoderOptions, input: I) -> Self {
        Self {
            registry,
            options,
            input,
        }
    }

    /// Decode a top-level record
    pub(crate) fn decode_root(mut self, schema: &SchemaDefinition) -> Result<Record, DecodeError> {
        let root = BindingContext::empty();
        let record = self.decode_record(&schema.name, &schema.fields, &root)?;

        if self.options.require_full_consumption && !self.input.at_end() {
            return Err(DecodeError::TrailingInput {
                schema: schema.name.clone(),
                offset: self.input.position(),
                remaining: self.input.remaining(),
            });
        }
        Ok(record)
    }

    fn decode_record(
        &mut self,
        schema: &str,
        fields: &[FieldDefinition],
        parent: &BindingContext<'_>,
    ) -> Result<Record, DecodeError> {
        let mut values: Vec<(String, DecodedValue)> = Vec::with_capacity(fields.len());

        for field in fields {
            let site = Site {
                schema,
                field: &field.name,
            };
            let offset = self.input.position();
            let value = {
                let ctx = BindingContext::record(&values, parent);
                self.decode_type(&field.ty, site, &ctx)?
            };
            trace!(
                schema,
                field = %field.name,
                offset,
                consumed = self.input.position() - offset,
                "decoded field"
            );
            values.push((field.name.clone(), value));
        }

        Ok(Record::new(schema, values))
    }

    fn decode_type(
        &mut self,
        ty: &TypeExpr,
        site: Site<'_>,
        ctx: &BindingContext<'_>,
    ) -> Result<DecodedValue, DecodeError> {
        let offset = self.input.position();

        match ty {
            TypeExpr::Primitive(p) => self
                .input
                .read_primitive(*p, self.options.default_endianness)
                .map(DecodedValue::Scalar)
                .map_err(|e| read_error(e, site, offset)),

            TypeExpr::Reference { name, args } => {
                let def = self
                    .registry
                    .resolve_from(name, args, site.schema, site.field)?;
                self.decode_record(&def.name, &def.fields, ctx)
                    .map(DecodedValue::Record)
            }

            TypeExpr::Param(p) => Err(DecodeError::TypeMismatch {
                schema: site.schema.to_string(),
                field: site.field.to_string(),
                offset,
                reason: format!("type parameter '{}' was never substituted", p),
            }),

            TypeExpr::InlineSchema(fields) => {
                let name = format!("{}.{}", site.schema, site.field);
                self.decode_record(&name, fields, ctx).map(DecodedValue::Record)
            }

            TypeExpr::FixedArray { element, count } => {
                let n = self.count(count, site, ctx)?;
                if n > self.options.max_array_len {
                    return Err(self.too_long(site, n));
                }

                let mut items: Vec<DecodedValue> = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    let item = {
                        let actx = BindingContext::array(site.field, &items, ctx);
                        self.decode_type(element, site, &actx)?
                    };
                    items.push(item);
                }
                Ok(DecodedValue::Array(items))
            }

            TypeExpr::RepeatUntilArray { element, until }
            | TypeExpr::TextRepeat { element, until } => self.decode_repeat(element, until, site, ctx),

            TypeExpr::BinaryString { length, encoding } => {
                let n = self.count(length, site, ctx)?;
                self.input
                    .read_string(n, *encoding)
                    .map(text_value)
                    .map_err(|e| read_error(e, site, offset))
            }

            TypeExpr::TextUntil {
                delimiter,
                escaped,
                trim,
            } => self
                .input
                .read_until(delimiter, *escaped)
                .map(|s| captured(s, *trim))
                .map_err(|e| read_error(e, site, offset)),

            TypeExpr::TextBetween {
                open,
                close,
                escaped,
                trim,
            } => self
                .input
                .read_between(open, close, *escaped)
                .map(|s| captured(s, *trim))
                .map_err(|e| read_error(e, site, offset)),

            TypeExpr::TextRest { trim } => self
                .input
                .read_rest()
                .map(|s| captured(s, *trim))
                .map_err(|e| read_error(e, site, offset)),
        }
    }

    /// Append elements until the terminator holds; the terminating element is kept
    fn decode_repeat(
        &mut self,
        element: &TypeExpr,
        until: &Terminator,
        site: Site<'_>,
        ctx: &BindingContext<'_>,
    ) -> Result<DecodedValue, DecodeError> {
        let mut items: Vec<DecodedValue> = Vec::new();

        loop {
            if self.input.at_end() {
                match until {
                    Terminator::End => break,
                    Terminator::Condition(cond) => {
                        return Err(DecodeError::OutOfBounds {
                            schema: site.schema.to_string(),
                            field: site.field.to_string(),
                            offset: self.input.position(),
                            detail: format!(
                                "input exhausted after {} element(s) before '{}' held",
                                items.len(),
                                cond
                            ),
                        });
                    }
                }
            }

            let start = self.input.position();
            let item = {
                let actx = BindingContext::array(site.field, &items, ctx);
                self.decode_type(element, site, &actx)?
            };
            if self.input.position() == start {
                return Err(DecodeError::NoProgress {
                    schema: site.schema.to_string(),
                    field: site.field.to_string(),
                    offset: start,
                });
            }
            items.push(item);
            trace!(schema = site.schema, field = site.field, len = items.len(), "repeat iteration");

            if items.len() > self.options.max_array_len {
                return Err(self.too_long(site, items.len()));
            }

            if let Terminator::Condition(cond) = until {
                let actx = BindingContext::array(site.field, &items, ctx);
                let done = evaluate_condition(cond, &actx)
                    .map_err(|e| self.eval_error(e, cond, site))?;
                if done {
                    break;
                }
            }
        }

        Ok(DecodedValue::Array(items))
    }

    fn count(
        &self,
        expr: &Expression,
        site: Site<'_>,
        ctx: &BindingContext<'_>,
    ) -> Result<usize, DecodeError> {
        evaluate_count(expr, ctx).map_err(|e| self.eval_error(e, expr, site))
    }

    fn eval_error(&self, err: EvalError, expr: &Expression, site: Site<'_>) -> DecodeError {
        let offset = self.input.position();
        match err {
            EvalError::ConditionEvaluation(reason) => DecodeError::ConditionEvaluation {
                schema: site.schema.to_string(),
                field: site.field.to_string(),
                offset,
                expr: expr.to_string(),
                reason,
            },
            EvalError::TypeMismatch(reason) => DecodeError::TypeMismatch {
                schema: site.schema.to_string(),
                field: site.field.to_string(),
                offset,
                reason,
            },
        }
    }

    fn too_long(&self, site: Site<'_>, len: usize) -> DecodeError {
        DecodeError::ArrayTooLong {
            schema: site.schema.to_string(),
            field: site.field.to_string(),
            len,
            limit: self.options.max_array_len,
        }
    }
}

fn text_value(s: String) -> DecodedValue {
    DecodedValue::Scalar(Scalar::Text(s))
}

fn captured(s: String, trim: bool) -> DecodedValue {
    if trim {
        text_value(s.trim().to_string())
    } else {
        text_value(s)
    }
}

fn read_error(err: ReadError, site: Site<'_>, offset: usize) -> DecodeError {
    let schema = site.schema.to_string();
    let field = site.field.to_string();
    match err {
        ReadError::OutOfBounds(detail) => DecodeError::OutOfBounds {
            schema,
            field,
            offset,
            detail,
        },
        ReadError::Unexpected(expected) => DecodeError::UnexpectedInput {
            schema,
            field,
            offset,
            expected,
        },
        ReadError::InvalidText(reason) => DecodeError::InvalidText {
            schema,
            field,
            offset,
            reason,
        },
        ReadError::Unsupported(reason) => DecodeError::TypeMismatch {
            schema,
            field,
            offset,
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_schemas;

    fn registry(source: &str) -> SchemaRegistry {
        let reg = SchemaRegistry::new(parse_schemas(source).unwrap().definitions).unwrap();
        reg.validate().unwrap();
        reg
    }

    #[test]
    fn test_raw_inline_schema_decodes_as_anonymous_record() {
        let reg = registry("binary Empty { }");
        let options = DecoderOptions::default();
        let schema = SchemaDefinition {
            kind: crate::ast::SchemaKind::Binary,
            name: "Manual".into(),
            type_params: vec![],
            fields: vec![FieldDefinition::new(
                "Inner",
                TypeExpr::InlineSchema(vec![FieldDefinition::new(
                    "Value",
                    TypeExpr::primitive(crate::ast::PrimitiveKind::Byte, None),
                )]),
            )],
            span: crate::ast::Span::synthetic(),
        };
        let record = Decoder::new(&reg, &options, BinaryInput::new(&[7]))
            .decode_root(&schema)
            .unwrap();
        let inner = record.get("Inner").and_then(|v| v.as_record()).unwrap();
        assert_eq!(inner.schema, "Manual.Inner");
        assert_eq!(inner.get("Value").and_then(|v| v.as_i128()), Some(7));
    }

    #[test]
    fn test_unsubstituted_param_is_type_mismatch() {
        let reg = registry("binary Empty { }");
        let options = DecoderOptions::default();
        let schema = SchemaDefinition {
            kind: crate::ast::SchemaKind::Binary,
            name: "Open".into(),
            type_params: vec!["T".into()],
            fields: vec![FieldDefinition::new("Value", TypeExpr::Param("T".into()))],
            span: crate::ast::Span::synthetic(),
        };
        let err = Decoder::new(&reg, &options, BinaryInput::new(&[1]))
            .decode_root(&schema)
            .unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_text_capture_on_binary_input_is_rejected() {
        let reg = registry("binary Empty { }");
        let options = DecoderOptions::default();
        let schema = SchemaDefinition {
            kind: crate::ast::SchemaKind::Binary,
            name: "Mixed".into(),
            type_params: vec![],
            fields: vec![FieldDefinition::new("Body", TypeExpr::TextRest { trim: false })],
            span: crate::ast::Span::synthetic(),
        };
        let err = Decoder::new(&reg, &options, BinaryInput::new(b"abc"))
            .decode_root(&schema)
            .unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { offset: 0, .. }));
    }
}
