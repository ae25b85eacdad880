//! Schema AST - the type graph produced by the parser
//!
//! Each schema is a named, ordered list of fields. Every field carries a
//! [`TypeExpr`], a closed set of layout constructs:
//! - **Primitive**: fixed-width integers and floats with a byte order
//! - **Reference**: `Name` or `Name<Args>` pointing at another schema
//! - **Param**: a type parameter of the enclosing generic schema
//! - **InlineSchema**: an anonymous `{ ... }` nested record
//! - **Arrays**: `T[count]`, `T repeat until ...`, `repeat T until ...`
//! - **Text captures**: `until`, `between`, `rest`
//!
//! ## Pipeline Flow
//!
//! ```text
//! Source → Parser → SchemaDefinitions (+ diagnostics)
//!                        ↓
//!          Registry (inline hoisting, eager validation)
//!                        ↓
//!        resolve(name, args) → concrete SchemaDefinition
//!                        ↓
//!            Binary / Text decoder → DecodedValue
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

// =============================================================================
// SCHEMAS
// =============================================================================

/// Which decoder a schema is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Binary,
    Text,
}

impl SchemaKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            SchemaKind::Binary => "binary",
            SchemaKind::Text => "text",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A schema declaration: `binary Name<T, U> { field: type, ... }`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub kind: SchemaKind,
    pub name: String,
    /// Type parameter names, empty for non-generic schemas
    pub type_params: Vec<String>,
    /// Field order fixes decode order
    pub fields: Vec<FieldDefinition>,
    pub span: Span,
}

impl SchemaDefinition {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render the schema back to DSL source
    pub fn to_dsl_string(&self) -> String {
        let params = if self.type_params.is_empty() {
            String::new()
        } else {
            format!("<{}>", self.type_params.join(", "))
        };
        let fields: Vec<String> = self.fields.iter().map(|f| f.to_dsl_string()).collect();
        format!(
            "{} {}{} {{ {} }}",
            self.kind,
            self.name,
            params,
            fields.join(", ")
        )
    }
}

/// A single `name: type` entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            span: Span::synthetic(),
        }
    }

    pub fn to_dsl_string(&self) -> String {
        format!("{}: {}", self.name, self.ty)
    }
}

// =============================================================================
// TYPE EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[serde(alias = "le")]
    Little,
    #[serde(alias = "be")]
    Big,
}

impl Endianness {
    pub fn suffix(&self) -> &'static str {
        match self {
            Endianness::Little => "le",
            Endianness::Big => "be",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Byte,
    SByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
}

impl PrimitiveKind {
    /// Width in bytes
    pub fn width(&self) -> usize {
        match self {
            PrimitiveKind::Byte | PrimitiveKind::SByte => 1,
            PrimitiveKind::Short | PrimitiveKind::UShort => 2,
            PrimitiveKind::Int | PrimitiveKind::UInt | PrimitiveKind::Float => 4,
            PrimitiveKind::Long | PrimitiveKind::ULong | PrimitiveKind::Double => 8,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::SByte => "sbyte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::UShort => "ushort",
            PrimitiveKind::Int => "int",
            PrimitiveKind::UInt => "uint",
            PrimitiveKind::Long => "long",
            PrimitiveKind::ULong => "ulong",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    /// Accepts the long names and the `u8`..`f64` aliases
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "byte" | "u8" => PrimitiveKind::Byte,
            "sbyte" | "i8" => PrimitiveKind::SByte,
            "short" | "i16" => PrimitiveKind::Short,
            "ushort" | "u16" => PrimitiveKind::UShort,
            "int" | "i32" => PrimitiveKind::Int,
            "uint" | "u32" => PrimitiveKind::UInt,
            "long" | "i64" => PrimitiveKind::Long,
            "ulong" | "u64" => PrimitiveKind::ULong,
            "float" | "f32" => PrimitiveKind::Float,
            "double" | "f64" => PrimitiveKind::Double,
            _ => return None,
        })
    }
}

/// A primitive with its declared byte order (`None` = configured default)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub endianness: Option<Endianness>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringEncoding {
    Utf8,
    Ascii,
}

/// What stops a repeat loop
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terminator {
    /// Stop when the input unit is exhausted
    End,
    /// Stop once the condition holds for the array built so far
    Condition(Expression),
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::End => f.write_str("end"),
            Terminator::Condition(c) => write!(f, "{}", c),
        }
    }
}

/// Field type expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeExpr {
    Primitive(Primitive),

    /// `Name` or `Name<Args>`
    Reference { name: String, args: Vec<TypeExpr> },

    /// Type parameter of the enclosing generic schema
    /// Replaced structurally during instantiation
    Param(String),

    /// Anonymous `{ ... }` record
    InlineSchema(Vec<FieldDefinition>),

    /// `T[count]` - count is a literal or a path over earlier fields
    FixedArray {
        element: Box<TypeExpr>,
        count: Expression,
    },

    /// `T repeat until <condition | end>`
    RepeatUntilArray {
        element: Box<TypeExpr>,
        until: Terminator,
    },

    /// `string[count] [utf8|ascii]` (binary only)
    BinaryString {
        length: Expression,
        encoding: StringEncoding,
    },

    /// `until 'delim' [raw] [trim]` (text only)
    ///
    /// Backslash escapes are honored unless `raw`.
    TextUntil {
        delimiter: String,
        escaped: bool,
        trim: bool,
    },

    /// `between 'open' 'close' [escaped] [trim]` (text only)
    TextBetween {
        open: String,
        close: String,
        escaped: bool,
        trim: bool,
    },

    /// `rest [trim]` (text only)
    TextRest { trim: bool },

    /// `repeat T until <condition | end>` (text only)
    TextRepeat {
        element: Box<TypeExpr>,
        until: Terminator,
    },
}

impl TypeExpr {
    pub fn reference(name: impl Into<String>) -> Self {
        TypeExpr::Reference {
            name: name.into(),
            args: vec![],
        }
    }

    pub fn primitive(kind: PrimitiveKind, endianness: Option<Endianness>) -> Self {
        TypeExpr::Primitive(Primitive { kind, endianness })
    }

    /// True if no type parameter occurs anywhere inside
    pub fn is_concrete(&self) -> bool {
        match self {
            TypeExpr::Param(_) => false,
            TypeExpr::Reference { args, .. } => args.iter().all(|a| a.is_concrete()),
            TypeExpr::InlineSchema(fields) => fields.iter().all(|f| f.ty.is_concrete()),
            TypeExpr::FixedArray { element, .. }
            | TypeExpr::RepeatUntilArray { element, .. }
            | TypeExpr::TextRepeat { element, .. } => element.is_concrete(),
            _ => true,
        }
    }

    /// Text captures cannot appear in binary schemas
    pub fn is_text_only(&self) -> bool {
        matches!(
            self,
            TypeExpr::TextUntil { .. }
                | TypeExpr::TextBetween { .. }
                | TypeExpr::TextRest { .. }
                | TypeExpr::TextRepeat { .. }
        )
    }

    /// Byte-level leaves cannot appear in text schemas
    pub fn is_binary_only(&self) -> bool {
        matches!(
            self,
            TypeExpr::Primitive(_) | TypeExpr::BinaryString { .. }
        )
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn modifiers(escaped: bool, trim: bool) -> String {
    let mut out = String::new();
    if escaped {
        out.push_str(" escaped");
    }
    if trim {
        out.push_str(" trim");
    }
    out
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Primitive(p) => match p.endianness {
                Some(e) => write!(f, "{} {}", p.kind.keyword(), e.suffix()),
                None => f.write_str(p.kind.keyword()),
            },
            TypeExpr::Reference { name, args } if args.is_empty() => f.write_str(name),
            TypeExpr::Reference { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}<{}>", name, args.join(", "))
            }
            TypeExpr::Param(name) => f.write_str(name),
            TypeExpr::InlineSchema(fields) => {
                let fields: Vec<String> = fields.iter().map(|f| f.to_dsl_string()).collect();
                write!(f, "{{ {} }}", fields.join(", "))
            }
            TypeExpr::FixedArray { element, count } => write!(f, "{}[{}]", element, count),
            TypeExpr::RepeatUntilArray { element, until } => {
                write!(f, "{} repeat until {}", element, until)
            }
            TypeExpr::BinaryString { length, encoding } => match encoding {
                StringEncoding::Utf8 => write!(f, "string[{}]", length),
                StringEncoding::Ascii => write!(f, "string[{}] ascii", length),
            },
            TypeExpr::TextUntil {
                delimiter,
                escaped,
                trim,
            } => {
                write!(f, "until {}", quote(delimiter))?;
                if !escaped {
                    f.write_str(" raw")?;
                }
                f.write_str(&modifiers(false, *trim))
            }
            TypeExpr::TextBetween {
                open,
                close,
                escaped,
                trim,
            } => write!(
                f,
                "between {} {}{}",
                quote(open),
                quote(close),
                modifiers(*escaped, *trim)
            ),
            TypeExpr::TextRest { trim } => write!(f, "rest{}", modifiers(false, *trim)),
            TypeExpr::TextRepeat { element, until } => {
                write!(f, "repeat {} until {}", element, until)
            }
        }
    }
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

/// Count and loop-condition sublanguage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    Literal(Literal),
    Path(PathExpr),
    Compare {
        left: PathExpr,
        op: CompareOp,
        right: Literal,
    },
}

impl Expression {
    /// The path this expression reads, if any
    pub fn path(&self) -> Option<&PathExpr> {
        match self {
            Expression::Literal(_) => None,
            Expression::Path(p) => Some(p),
            Expression::Compare { left, .. } => Some(left),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(l) => write!(f, "{}", l),
            Expression::Path(p) => write!(f, "{}", p),
            Expression::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
        }
    }
}

/// Dotted path: `Records[-1].Type`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathExpr {
    pub segments: Vec<PathSegment>,
}

impl PathExpr {
    pub fn root(&self) -> Option<&PathSegment> {
        self.segments.first()
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub name: String,
    /// Negative indices count from the end
    pub index: Option<i64>,
}

impl PathSegment {
    pub fn new(name: impl Into<String>, index: Option<i64>) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.name, i),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Literal scalar in an expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Text(String),
}

// Floats compare by bit pattern so literals can live in instantiation keys
impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Integer(a), Literal::Integer(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            (Literal::Text(a), Literal::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::Integer(i) => i.hash(state),
            Literal::Float(x) => x.to_bits().hash(state),
            Literal::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::Text(s) => f.write_str(&quote(s)),
        }
    }
}

// =============================================================================
// SOURCE SPANS
// =============================================================================

/// Byte offsets into the DSL source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Span for nodes created by the registry rather than the parser
    pub fn synthetic() -> Self {
        Self {
            start: usize::MAX,
            end: usize::MAX,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.start == usize::MAX
    }
}

// =============================================================================
// VISITOR
// =============================================================================

/// Walks a type expression depth first
///
/// Override the hooks you care about; `visit_type` drives the traversal.
pub trait TypeVisitor {
    fn visit_type(&mut self, ty: &TypeExpr) {
        match ty {
            TypeExpr::Reference { name, args } => {
                self.visit_reference(name, args);
                for arg in args {
                    self.visit_type(arg);
                }
            }
            TypeExpr::Param(name) => self.visit_param(name),
            TypeExpr::InlineSchema(fields) => {
                for field in fields {
                    self.visit_type(&field.ty);
                }
            }
            TypeExpr::FixedArray { element, count } => {
                self.visit_expression(count);
                self.visit_type(element);
            }
            TypeExpr::BinaryString { length, .. } => self.visit_expression(length),
            TypeExpr::RepeatUntilArray { element, until }
            | TypeExpr::TextRepeat { element, until } => {
                self.visit_type(element);
                if let Terminator::Condition(c) = until {
                    self.visit_expression(c);
                }
            }
            TypeExpr::Primitive(_)
            | TypeExpr::TextUntil { .. }
            | TypeExpr::TextBetween { .. }
            | TypeExpr::TextRest { .. } => {}
        }
    }

    fn visit_reference(&mut self, _name: &str, _args: &[TypeExpr]) {}

    fn visit_param(&mut self, _name: &str) {}

    fn visit_expression(&mut self, _expr: &Expression) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_widths() {
        assert_eq!(PrimitiveKind::Byte.width(), 1);
        assert_eq!(PrimitiveKind::UShort.width(), 2);
        assert_eq!(PrimitiveKind::Float.width(), 4);
        assert_eq!(PrimitiveKind::ULong.width(), 8);
        assert_eq!(PrimitiveKind::from_keyword("i16"), Some(PrimitiveKind::Short));
        assert_eq!(PrimitiveKind::from_keyword("Item"), None);
    }

    #[test]
    fn test_type_rendering() {
        let ty = TypeExpr::FixedArray {
            element: Box::new(TypeExpr::Param("T".into())),
            count: Expression::Path(PathExpr {
                segments: vec![PathSegment::new("Length", None)],
            }),
        };
        assert_eq!(ty.to_string(), "T[Length]");

        let cond = Expression::Compare {
            left: PathExpr {
                segments: vec![
                    PathSegment::new("Records", Some(-1)),
                    PathSegment::new("Type", None),
                ],
            },
            op: CompareOp::Eq,
            right: Literal::Integer(0),
        };
        assert_eq!(cond.to_string(), "Records[-1].Type = 0");
    }

    #[test]
    fn test_is_concrete() {
        let generic = TypeExpr::Reference {
            name: "LengthPrefixed".into(),
            args: vec![TypeExpr::Param("T".into())],
        };
        assert!(!generic.is_concrete());
        let concrete = TypeExpr::Reference {
            name: "LengthPrefixed".into(),
            args: vec![TypeExpr::reference("Item")],
        };
        assert!(concrete.is_concrete());
    }

    #[test]
    fn test_float_literal_equality_by_bits() {
        assert_eq!(Literal::Float(1.5), Literal::Float(1.5));
        assert_ne!(Literal::Float(0.0), Literal::Float(-0.0));
        assert_ne!(Literal::Integer(1), Literal::Float(1.0));
    }

    #[test]
    fn test_visitor_collects_references() {
        struct Refs(Vec<String>);
        impl TypeVisitor for Refs {
            fn visit_reference(&mut self, name: &str, _args: &[TypeExpr]) {
                self.0.push(name.to_string());
            }
        }

        let ty = TypeExpr::Reference {
            name: "Outer".into(),
            args: vec![TypeExpr::InlineSchema(vec![FieldDefinition::new(
                "x",
                TypeExpr::reference("Inner"),
            )])],
        };
        let mut refs = Refs(vec![]);
        refs.visit_type(&ty);
        assert_eq!(refs.0, vec!["Outer", "Inner"]);
    }
}
