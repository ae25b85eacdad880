//! Compile entry point
//!
//! `compile` runs the whole schema phase up front: parse, register, hoist
//! and validate. Any schema-level error is fatal and surfaces here, before
//! a single input unit is decoded. The returned [`CompiledSchemas`] is
//! read-only afterwards and can be shared across threads decoding rows in
//! parallel.

use std::sync::Arc;
use tracing::debug;

use crate::ast::SchemaDefinition;
use crate::config::DecoderOptions;
use crate::decoder::{decode_binary, decode_text};
use crate::diagnostics::Diagnostic;
use crate::error::{DecodeError, SchemaError};
use crate::parser::{parse_schemas, parse_type_reference};
use crate::registry::SchemaRegistry;
use crate::value::Record;

/// A compiled unit of schemas
#[derive(Debug)]
pub struct CompiledSchemas {
    registry: SchemaRegistry,
    diagnostics: Vec<Diagnostic>,
    options: DecoderOptions,
}

/// Compile DSL source with default decoder options
pub fn compile(source: &str) -> Result<CompiledSchemas, SchemaError> {
    compile_with(source, DecoderOptions::default())
}

/// Compile DSL source
pub fn compile_with(source: &str, options: DecoderOptions) -> Result<CompiledSchemas, SchemaError> {
    let parsed = parse_schemas(source)?;
    let registry = SchemaRegistry::new(parsed.definitions)?
        .with_instantiation_limit(options.max_instantiations);
    registry.validate()?;

    let mut diagnostics = parsed.diagnostics;
    diagnostics.extend(registry.diagnostics().iter().cloned());

    debug!(
        schemas = registry.len(),
        instantiations = registry.instantiation_count(),
        diagnostics = diagnostics.len(),
        "compiled schema source"
    );

    Ok(CompiledSchemas {
        registry,
        diagnostics,
        options,
    })
}

impl CompiledSchemas {
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Non-fatal findings from parsing and registration
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Resolve an entry name such as `Packet` or `LengthPrefixed<Item>`
    pub fn schema(&self, name: &str) -> Result<Arc<SchemaDefinition>, SchemaError> {
        let ty = parse_type_reference(name)?;
        self.registry.resolve_type(&ty)
    }

    /// DecodeBinary(buffer, schemaName)
    pub fn decode_binary(&self, buffer: &[u8], name: &str) -> Result<Record, DecodeError> {
        let schema = self.schema(name)?;
        decode_binary(&self.registry, &self.options, &schema, buffer)
    }

    /// DecodeText(unit, schemaName)
    pub fn decode_text(&self, unit: &str, name: &str) -> Result<Record, DecodeError> {
        let schema = self.schema(name)?;
        decode_text(&self.registry, &self.options, &schema, unit)
    }
}
