//! Schema diagnostics
//!
//! Non-fatal findings reported alongside a successful parse/compile.
//! Fatal problems are `SchemaError`s instead.

use serde::{Deserialize, Serialize};

use crate::ast::Span;

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Hint,
    Info,
}

/// Diagnostic codes for categorizing issues
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // =========================================================================
    // Parse findings
    // =========================================================================
    RedundantEndianness,
    UnusedTypeParameter,
    OuterScopePath,

    // =========================================================================
    // Registry findings
    // =========================================================================
    InlineSchemaHoisted,
}

/// Source location span
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceSpan {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span from byte offsets (requires source text for line/col calculation)
    pub fn from_byte_offset(source: &str, start: usize, end: usize) -> Self {
        let (start_line, start_col) = byte_to_line_col(source, start);
        let (end_line, end_col) = byte_to_line_col(source, end);
        Self::new(start_line, start_col, end_line, end_col)
    }

    /// Convert an AST span; `None` for synthetic nodes
    pub fn from_span(source: &str, span: Span) -> Option<Self> {
        if span.is_synthetic() {
            None
        } else {
            Some(Self::from_byte_offset(source, span.start, span.end))
        }
    }
}

/// Convert byte offset to line and column
fn byte_to_line_col(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 1u32;

    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// A diagnostic message with location and severity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message)
    }

    /// Create a hint diagnostic
    pub fn hint(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Hint, code, message)
    }

    /// Create an info diagnostic
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, code, message)
    }

    fn with_severity(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            span: None,
        }
    }

    /// Add source span
    pub fn with_span(mut self, span: Option<SourceSpan>) -> Self {
        self.span = span;
        self
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

// =============================================================================
// Convenience Builders
// =============================================================================

pub fn unused_type_parameter(schema: &str, param: &str) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::UnusedTypeParameter,
        format!("type parameter '{}' of '{}' is never used", param, schema),
    )
}

pub fn redundant_endianness(schema: &str, field: &str) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::RedundantEndianness,
        format!(
            "{}.{}: byte order has no effect on a single-byte primitive",
            schema, field
        ),
    )
}

pub fn outer_scope_path(schema: &str, field: &str, root: &str) -> Diagnostic {
    Diagnostic::hint(
        DiagnosticCode::OuterScopePath,
        format!(
            "{}.{}: '{}' is not an earlier field; it will be looked up in enclosing records",
            schema, field, root
        ),
    )
}
