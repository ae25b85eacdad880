//! record-dsl: schema compiler and decoder engine for record layouts
//!
//! A small DSL declares binary or textual record formats; compiled schemas
//! decode byte buffers or text units into a value tree a query engine can
//! project into rows:
//! - AST types (SchemaDefinition, TypeExpr, Expression)
//! - Nom-based schema parser with diagnostics
//! - Schema registry with generic instantiation (monomorphization)
//! - Expression evaluator for counts and loop conditions
//! - Binary and text decoders sharing one engine
//! - Projection bridge for row expansion
//! - YAML decoder options and loader
//!
//! ```no_run
//! let compiled = record_dsl::compile(
//!     "binary Item { Value: byte }
//!      binary LengthPrefixed<T> { Length: byte, Data: T[Length] }",
//! )?;
//! let _record = compiled.decode_binary(&[0x02, 0x0A, 0x14], "LengthPrefixed<Item>")?;
//! # Ok::<(), record_dsl::Error>(())
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod parser;
pub mod projection;
pub mod registry;
pub mod value;

// Re-export commonly used types
pub use ast::{
    Endianness, Expression, FieldDefinition, SchemaDefinition, SchemaKind, Span, TypeExpr,
};
pub use compiler::{compile, compile_with, CompiledSchemas};
pub use config::{ConfigLoader, DecoderOptions};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity, SourceSpan};
pub use error::{DecodeError, Error, Result, SchemaError};
pub use expr::{evaluate, BindingContext};
pub use parser::parse_schemas;
pub use projection::{ExpandedRow, ProjectionError, RecordView};
pub use registry::{InstantiationKey, SchemaRegistry};
pub use value::{DecodedValue, Record, Scalar};
