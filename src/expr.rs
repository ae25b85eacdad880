//! Expression evaluator for array counts and loop conditions
//!
//! Evaluation is a pure function of an [`Expression`] and an explicit
//! [`BindingContext`]. The context is a chain of frames, innermost first:
//!
//! ```text
//! Array  "Records"  -> elements appended so far by the enclosing loop
//! Record            -> fields of the current record decoded so far
//! Record            -> fields of the enclosing record decoded so far
//! ...
//! ```
//!
//! A path root is looked up frame by frame; the first frame that binds the
//! name wins. Loop arrays are bound under the loop field's own name, so
//! `Records[-1].Type` inside `Records: Record repeat until ...` reads the
//! most recently appended element.

use std::cmp::Ordering;
use thiserror::Error;

use crate::ast::{CompareOp, Expression, Literal, PathExpr};
use crate::value::{DecodedValue, Scalar};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("{0}")]
    ConditionEvaluation(String),

    #[error("{0}")]
    TypeMismatch(String),
}

pub type EvalResult<T> = Result<T, EvalError>;

// ============================================================================
// Binding context
// ============================================================================

/// One scope level
#[derive(Debug, Clone, Copy)]
enum Frame<'a> {
    /// Fields of a record decoded so far, in declaration order
    Record(&'a [(String, DecodedValue)]),
    /// Array being built by a loop, bound under the loop field's name
    Array {
        name: &'a str,
        items: &'a [DecodedValue],
    },
}

#[derive(Debug, Clone, Copy)]
pub struct BindingContext<'a> {
    frame: Frame<'a>,
    parent: Option<&'a BindingContext<'a>>,
}

impl<'a> BindingContext<'a> {
    /// Outermost scope
    pub fn root(fields: &'a [(String, DecodedValue)]) -> Self {
        Self {
            frame: Frame::Record(fields),
            parent: None,
        }
    }

    pub fn empty() -> Self {
        Self::root(&[])
    }

    /// Nested record scope
    pub fn record(fields: &'a [(String, DecodedValue)], parent: &'a BindingContext<'a>) -> Self {
        Self {
            frame: Frame::Record(fields),
            parent: Some(parent),
        }
    }

    /// Loop scope exposing the array built so far
    pub fn array(name: &'a str, items: &'a [DecodedValue], parent: &'a BindingContext<'a>) -> Self {
        Self {
            frame: Frame::Array { name, items },
            parent: Some(parent),
        }
    }

    /// Innermost binding for a path root
    pub fn lookup(&self, name: &str) -> Option<Resolved<'a>> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            match ctx.frame {
                Frame::Record(fields) => {
                    if let Some((_, v)) = fields.iter().find(|(k, _)| k == name) {
                        return Some(Resolved::Value(v));
                    }
                }
                Frame::Array { name: bound, items } if bound == name => {
                    return Some(Resolved::Items(items));
                }
                Frame::Array { .. } => {}
            }
            scope = ctx.parent;
        }
        None
    }
}

/// What a path resolves to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Value(&'a DecodedValue),
    /// An in-progress loop array
    Items(&'a [DecodedValue]),
}

impl<'a> Resolved<'a> {
    fn items(self) -> Option<&'a [DecodedValue]> {
        match self {
            Resolved::Items(items) => Some(items),
            Resolved::Value(DecodedValue::Array(items)) => Some(items.as_slice()),
            Resolved::Value(_) => None,
        }
    }

    fn scalar(self) -> Option<&'a Scalar> {
        match self {
            Resolved::Value(DecodedValue::Scalar(s)) => Some(s),
            _ => None,
        }
    }

    fn kind_name(self) -> &'static str {
        match self {
            Resolved::Value(v) => v.kind_name(),
            Resolved::Items(_) => "array",
        }
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue<'a> {
    Bool(bool),
    Literal(Literal),
    Resolved(Resolved<'a>),
}

// ============================================================================
// Evaluation
// ============================================================================

pub fn evaluate<'a>(expr: &Expression, ctx: &BindingContext<'a>) -> EvalResult<EvalValue<'a>> {
    match expr {
        Expression::Literal(lit) => Ok(EvalValue::Literal(lit.clone())),
        Expression::Path(path) => resolve_path(path, ctx).map(EvalValue::Resolved),
        Expression::Compare { left, op, right } => {
            compare(left, *op, right, ctx).map(EvalValue::Bool)
        }
    }
}

/// Evaluate a loop condition
pub fn evaluate_condition(expr: &Expression, ctx: &BindingContext<'_>) -> EvalResult<bool> {
    match evaluate(expr, ctx)? {
        EvalValue::Bool(b) => Ok(b),
        other => Err(EvalError::TypeMismatch(format!(
            "condition '{}' is not a comparison (got {})",
            expr,
            describe(&other)
        ))),
    }
}

/// Evaluate an array count or string length
pub fn evaluate_count(expr: &Expression, ctx: &BindingContext<'_>) -> EvalResult<usize> {
    let count: i128 = match evaluate(expr, ctx)? {
        EvalValue::Literal(Literal::Integer(i)) => i as i128,
        EvalValue::Resolved(r) => match r.scalar().and_then(Scalar::as_i128) {
            Some(i) => i,
            None => {
                return Err(EvalError::TypeMismatch(format!(
                    "count '{}' must be an integer, found {}",
                    expr,
                    r.kind_name()
                )))
            }
        },
        other => {
            return Err(EvalError::TypeMismatch(format!(
                "count '{}' must be an integer, found {}",
                expr,
                describe(&other)
            )))
        }
    };

    if count < 0 {
        return Err(EvalError::ConditionEvaluation(format!(
            "count '{}' is negative ({})",
            expr, count
        )));
    }
    usize::try_from(count).map_err(|_| {
        EvalError::ConditionEvaluation(format!("count '{}' is too large ({})", expr, count))
    })
}

/// Walk a dotted path through the binding context
pub fn resolve_path<'a>(path: &PathExpr, ctx: &BindingContext<'a>) -> EvalResult<Resolved<'a>> {
    let mut segments = path.segments.iter();
    let Some(root) = segments.next() else {
        return Err(EvalError::ConditionEvaluation("empty path".to_string()));
    };

    let mut current = ctx.lookup(&root.name).ok_or_else(|| {
        EvalError::ConditionEvaluation(format!("'{}' is not bound in this scope", root.name))
    })?;
    if let Some(index) = root.index {
        current = index_into(current, index, &root.name)?;
    }

    for segment in segments {
        let record = match current {
            Resolved::Value(DecodedValue::Record(r)) => r,
            other => {
                return Err(EvalError::ConditionEvaluation(format!(
                    "cannot read '{}' from {} in '{}'",
                    segment.name,
                    other.kind_name(),
                    path
                )))
            }
        };
        let value = record.get(&segment.name).ok_or_else(|| {
            EvalError::ConditionEvaluation(format!(
                "record '{}' has no field '{}'",
                record.schema, segment.name
            ))
        })?;
        current = Resolved::Value(value);
        if let Some(index) = segment.index {
            current = index_into(current, index, &segment.name)?;
        }
    }

    Ok(current)
}

/// `[-k]` selects `len - k`; anything outside `0..len` is an error
fn index_into<'a>(target: Resolved<'a>, index: i64, name: &str) -> EvalResult<Resolved<'a>> {
    let items = target.items().ok_or_else(|| {
        EvalError::ConditionEvaluation(format!(
            "'{}' is {}, not an array",
            name,
            target.kind_name()
        ))
    })?;

    let len = items.len() as i128;
    let position = if index < 0 {
        len + index as i128
    } else {
        index as i128
    };
    if position < 0 || position >= len {
        return Err(EvalError::ConditionEvaluation(format!(
            "index {} is out of range for '{}' with {} element(s)",
            index, name, len
        )));
    }
    Ok(Resolved::Value(&items[position as usize]))
}

fn compare(
    left: &PathExpr,
    op: CompareOp,
    right: &Literal,
    ctx: &BindingContext<'_>,
) -> EvalResult<bool> {
    let resolved = resolve_path(left, ctx)?;
    let scalar = resolved.scalar().ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "'{}' is {}, cannot compare with {}",
            left,
            resolved.kind_name(),
            right
        ))
    })?;

    let ordering = match (scalar, right) {
        (Scalar::Text(a), Literal::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (s, Literal::Integer(i)) if s.is_numeric() => s.compare_numeric(Some(*i as i128), None),
        (s, Literal::Float(x)) if s.is_numeric() => s.compare_numeric(None, Some(*x)),
        (s, lit) => {
            return Err(EvalError::TypeMismatch(format!(
                "cannot compare '{}' ({}) with {}",
                left,
                s.type_name(),
                lit
            )))
        }
    };

    // NaN compares unequal to everything
    let Some(ordering) = ordering else {
        return Ok(op == CompareOp::Ne);
    };
    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

fn describe(value: &EvalValue<'_>) -> String {
    match value {
        EvalValue::Bool(b) => b.to_string(),
        EvalValue::Literal(l) => l.to_string(),
        EvalValue::Resolved(r) => r.kind_name().to_string(),
    }
}
