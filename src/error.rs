//! Error types for the compile phase and the decode phase
//!
//! Compile-phase errors (`SchemaError`) are fatal to the whole compiled unit
//! and surface before any input is decoded. Decode-phase errors
//! (`DecodeError`) are reported per input unit.

use thiserror::Error;

/// Errors raised while parsing, registering or resolving schemas
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("syntax error at line {line}, column {column} near '{token}': {message}")]
    Syntax {
        line: u32,
        column: usize,
        token: String,
        message: String,
    },

    #[error("schema '{name}' is defined more than once")]
    DuplicateSchema { name: String },

    #[error("field '{field}' is declared more than once in schema '{schema}'")]
    DuplicateField { schema: String, field: String },

    #[error("{schema}.{field}: unknown schema '{name}'")]
    UnresolvedReference {
        schema: String,
        field: String,
        name: String,
    },

    #[error("{schema}.{field}: '{name}' expects {expected} type argument(s), got {found}")]
    ArityMismatch {
        schema: String,
        field: String,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("{schema}.{field}: {reason}")]
    TypeMismatch {
        schema: String,
        field: String,
        reason: String,
    },

    #[error("{schema}.{field}: condition '{condition}' must index '{array}' from the end")]
    InvalidLoopCondition {
        schema: String,
        field: String,
        array: String,
        condition: String,
    },

    #[error("instantiating '{name}' exceeded the limit of {limit} generic instantiations")]
    InstantiationLimit { name: String, limit: usize },
}

/// Errors raised while decoding one input unit
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{schema}.{field}: input exhausted at offset {offset}: {detail}")]
    OutOfBounds {
        schema: String,
        field: String,
        offset: usize,
        detail: String,
    },

    #[error("{schema}.{field}: cannot evaluate '{expr}' at offset {offset}: {reason}")]
    ConditionEvaluation {
        schema: String,
        field: String,
        offset: usize,
        expr: String,
        reason: String,
    },

    #[error("{schema}.{field}: type mismatch at offset {offset}: {reason}")]
    TypeMismatch {
        schema: String,
        field: String,
        offset: usize,
        reason: String,
    },

    #[error("{schema}.{field}: expected '{expected}' at offset {offset}")]
    UnexpectedInput {
        schema: String,
        field: String,
        offset: usize,
        expected: String,
    },

    #[error("{schema}.{field}: repeated element consumed no input at offset {offset}")]
    NoProgress {
        schema: String,
        field: String,
        offset: usize,
    },

    #[error("{schema}.{field}: array length {len} exceeds the limit of {limit}")]
    ArrayTooLong {
        schema: String,
        field: String,
        len: usize,
        limit: usize,
    },

    #[error("{schema}.{field}: invalid text at offset {offset}: {reason}")]
    InvalidText {
        schema: String,
        field: String,
        offset: usize,
        reason: String,
    },

    #[error("{schema}: {remaining} unread byte(s)/char(s) after offset {offset}")]
    TrailingInput {
        schema: String,
        offset: usize,
        remaining: usize,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Any error produced by this crate
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
