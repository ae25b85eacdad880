//! Schema parser - DSL source to SchemaDefinitions
//!
//! ```text
//! binary LengthPrefixed<T> { Length: byte, Data: T[Length] }
//! binary Packet { Header: { Magic: int le, Version: short le }, Payload: byte }
//! binary Stream { Records: Record repeat until Records[-1].Type = 0 }
//! text Pair { Key: until '=', Value: rest }
//! text Config { Entries: repeat Pair until end }
//! ```
//!
//! Parsing is purely syntactic. Names are resolved later by the registry, so
//! schemas may reference definitions that appear further down the source.
//! Inside a generic schema, identifiers naming one of its type parameters
//! become `TypeExpr::Param`.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_until, take_while},
    character::complete::{
        alpha1, alphanumeric1, char, digit1, hex_digit1, multispace1, none_of, satisfy,
    },
    combinator::{all_consuming, cut, map, map_res, not, opt, recognize, value},
    error::{context, ErrorKind, ParseError as NomParseError, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use nom_locate::LocatedSpan;

use crate::ast::*;
use crate::diagnostics::{self, Diagnostic, SourceSpan};
use crate::error::SchemaError;

pub type Input<'a> = LocatedSpan<&'a str>;
type PResult<'a, T> = IResult<Input<'a>, T, VerboseError<Input<'a>>>;

const RESERVED: &[&str] = &[
    "binary", "text", "repeat", "until", "between", "rest", "end", "escaped", "raw", "trim", "string",
    "le", "be", "utf8", "ascii",
];

// ============================================================================
// Public API
// ============================================================================

/// Parser output: definitions in source order plus non-fatal findings
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSchemas {
    pub definitions: Vec<SchemaDefinition>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a complete DSL source
pub fn parse_schemas(source: &str) -> Result<ParsedSchemas, SchemaError> {
    let definitions = run(source, terminated(many0(schema_definition), ws))?;
    for def in &definitions {
        check_duplicate_fields(&def.name, &def.fields)?;
    }
    let diagnostics = lint(source, &definitions);
    Ok(ParsedSchemas {
        definitions,
        diagnostics,
    })
}

/// Parse a standalone type reference such as `LengthPrefixed<Item>`
pub fn parse_type_reference(text: &str) -> Result<TypeExpr, SchemaError> {
    run(text, delimited(ws, |i| type_expr(i, &[]), ws))
}

/// Parse a dotted path such as `Data[1].Value`
pub fn parse_path(text: &str) -> Result<PathExpr, SchemaError> {
    run(text, delimited(ws, path_expr, ws))
}

/// Parse a loop condition such as `Records[-1].Type = 0`
pub fn parse_condition(text: &str) -> Result<Expression, SchemaError> {
    run(text, terminated(condition, ws))
}

fn run<'a, O, F>(source: &'a str, parser: F) -> Result<O, SchemaError>
where
    F: FnMut(Input<'a>) -> PResult<'a, O>,
{
    match all_consuming(parser)(Input::new(source)) {
        Ok((_, out)) => Ok(out),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(syntax_error(e)),
        Err(nom::Err::Incomplete(_)) => Err(SchemaError::Syntax {
            line: 1,
            column: source.len() + 1,
            token: "<end of input>".to_string(),
            message: "incomplete input".to_string(),
        }),
    }
}

fn syntax_error(err: VerboseError<Input<'_>>) -> SchemaError {
    let Some((at, _)) = err.errors.first() else {
        return SchemaError::Syntax {
            line: 1,
            column: 1,
            token: String::new(),
            message: "invalid schema source".to_string(),
        };
    };

    let token = at
        .fragment()
        .split_whitespace()
        .next()
        .map(|t| t.chars().take(24).collect::<String>())
        .unwrap_or_else(|| "<end of input>".to_string());

    let mut expected = None;
    let mut contexts = Vec::new();
    for (_, kind) in &err.errors {
        match kind {
            VerboseErrorKind::Char(c) if expected.is_none() => expected = Some(format!("'{}'", c)),
            VerboseErrorKind::Context(c) => contexts.push(*c),
            _ => {}
        }
    }

    let message = match (expected, contexts.is_empty()) {
        (Some(e), true) => format!("expected {}", e),
        (Some(e), false) => format!("expected {} while parsing {}", e, contexts.join(" in ")),
        (None, false) => format!("expected {}", contexts.join(" in ")),
        (None, true) => "unexpected input".to_string(),
    };

    SchemaError::Syntax {
        line: at.location_line(),
        column: at.get_utf8_column(),
        token,
        message,
    }
}

// ============================================================================
// Lexical helpers
// ============================================================================

fn ws(input: Input) -> PResult<()> {
    value(
        (),
        many0(alt((multispace1, line_comment, block_comment))),
    )(input)
}

fn line_comment(input: Input) -> PResult<Input> {
    recognize(pair(tag("//"), take_while(|c| c != '\n')))(input)
}

fn block_comment(input: Input) -> PResult<Input> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

fn sym<'a>(c: char) -> impl FnMut(Input<'a>) -> PResult<'a, char> {
    preceded(ws, char(c))
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(Input<'a>) -> PResult<'a, Input<'a>> {
    terminated(
        tag(kw),
        not(satisfy(|c: char| c.is_alphanumeric() || c == '_')),
    )
}

fn identifier(input: Input) -> PResult<Input> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn failure<'a, O>(input: Input<'a>, ctx: &'static str) -> PResult<'a, O> {
    Err(nom::Err::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(ctx))],
    }))
}

/// Run an optional parser, propagating hard failures
fn attempt<'a, O>(
    result: PResult<'a, O>,
) -> Result<Option<(Input<'a>, O)>, nom::Err<VerboseError<Input<'a>>>> {
    match result {
        Ok(ok) => Ok(Some(ok)),
        Err(nom::Err::Error(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

// ============================================================================
// Schemas
// ============================================================================

fn schema_definition(input: Input) -> PResult<SchemaDefinition> {
    let (input, _) = ws(input)?;
    let start = input.location_offset();

    let (input, kind) = alt((
        value(SchemaKind::Binary, keyword("binary")),
        value(SchemaKind::Text, keyword("text")),
    ))(input)?;

    let (input, name) = cut(context("schema name", preceded(ws, identifier)))(input)?;
    let (input, type_params) = opt(type_param_list)(input)?;
    let type_params = type_params.unwrap_or_default();

    let (input, fields) = cut(context("field list", |i| field_block(i, &type_params)))(input)?;
    let end = input.location_offset();

    Ok((
        input,
        SchemaDefinition {
            kind,
            name: name.fragment().to_string(),
            type_params,
            fields,
            span: Span::new(start, end),
        },
    ))
}

fn type_param_list(input: Input) -> PResult<Vec<String>> {
    preceded(
        sym('<'),
        cut(context(
            "type parameter list",
            terminated(
                separated_list1(
                    sym(','),
                    map(preceded(ws, identifier), |p: Input| p.fragment().to_string()),
                ),
                sym('>'),
            ),
        )),
    )(input)
}

/// `{ name: type, ... }` with an optional trailing comma
fn field_block<'a>(input: Input<'a>, params: &[String]) -> PResult<'a, Vec<FieldDefinition>> {
    let (mut input, _) = sym('{')(input)?;
    let mut fields = Vec::new();

    loop {
        let (rest, _) = ws(input)?;
        if let Some((rest, _)) = attempt(char('}')(rest))? {
            return Ok((rest, fields));
        }

        let (rest, field) = field_definition(rest, params)?;
        fields.push(field);

        let (rest, _) = ws(rest)?;
        if let Some((rest, _)) = attempt(char(',')(rest))? {
            input = rest;
            continue;
        }

        let (rest, _) = cut(context("',' or '}'", char('}')))(rest)?;
        return Ok((rest, fields));
    }
}

fn field_definition<'a>(input: Input<'a>, params: &[String]) -> PResult<'a, FieldDefinition> {
    let start = input.location_offset();
    let (input, name) = context("field name", identifier)(input)?;
    let (input, _) = cut(context("':'", sym(':')))(input)?;
    let (input, ty) = cut(context("field type", |i| type_expr(i, params)))(input)?;
    let end = input.location_offset();

    Ok((
        input,
        FieldDefinition {
            name: name.fragment().to_string(),
            ty,
            span: Span::new(start, end),
        },
    ))
}

// ============================================================================
// Type Expressions
// ============================================================================

/// A base type followed by any number of `[count]` / `repeat until` suffixes
fn type_expr<'a>(input: Input<'a>, params: &[String]) -> PResult<'a, TypeExpr> {
    let (mut input, mut ty) = base_type(input, params)?;

    loop {
        if let Some((rest, count)) = attempt(array_suffix(input))? {
            ty = TypeExpr::FixedArray {
                element: Box::new(ty),
                count,
            };
            input = rest;
            continue;
        }
        if let Some((rest, until)) = attempt(postfix_repeat(input))? {
            ty = TypeExpr::RepeatUntilArray {
                element: Box::new(ty),
                until,
            };
            input = rest;
            continue;
        }
        return Ok((input, ty));
    }
}

fn array_suffix(input: Input) -> PResult<Expression> {
    preceded(
        sym('['),
        cut(context("array count", terminated(count_expr, sym(']')))),
    )(input)
}

fn postfix_repeat(input: Input) -> PResult<Terminator> {
    preceded(
        preceded(ws, keyword("repeat")),
        cut(context(
            "repeat terminator",
            preceded(preceded(ws, keyword("until")), terminator),
        )),
    )(input)
}

fn base_type<'a>(input: Input<'a>, params: &[String]) -> PResult<'a, TypeExpr> {
    let (input, _) = ws(input)?;

    if input.fragment().starts_with('{') {
        return map(|i| field_block(i, params), TypeExpr::InlineSchema)(input);
    }

    let (rest, word) = context("type", identifier)(input)?;
    let word = *word.fragment();

    match word {
        "repeat" => {
            let (rest, element) = cut(context("repeated element", |i| type_expr(i, params)))(rest)?;
            let (rest, _) = cut(context("'until'", preceded(ws, keyword("until"))))(rest)?;
            let (rest, until) = cut(context("repeat terminator", terminator))(rest)?;
            Ok((
                rest,
                TypeExpr::TextRepeat {
                    element: Box::new(element),
                    until,
                },
            ))
        }
        "until" => {
            let (rest, delimiter) = cut(context("delimiter", string_literal))(rest)?;
            let (rest, modifiers) = capture_modifiers(rest)?;
            if modifiers.escaped {
                return failure(rest, "'until' honors escapes unless marked 'raw'");
            }
            Ok((
                rest,
                TypeExpr::TextUntil {
                    delimiter,
                    escaped: !modifiers.raw,
                    trim: modifiers.trim,
                },
            ))
        }
        "between" => {
            let (rest, open) = cut(context("opening delimiter", string_literal))(rest)?;
            let (rest, close) = cut(context("closing delimiter", string_literal))(rest)?;
            let (rest, modifiers) = capture_modifiers(rest)?;
            if modifiers.raw {
                return failure(rest, "'between' takes 'escaped', not 'raw'");
            }
            Ok((
                rest,
                TypeExpr::TextBetween {
                    open,
                    close,
                    escaped: modifiers.escaped,
                    trim: modifiers.trim,
                },
            ))
        }
        "rest" => {
            let (rest, modifiers) = capture_modifiers(rest)?;
            if modifiers.escaped || modifiers.raw {
                return failure(rest, "'rest' only takes 'trim'");
            }
            Ok((rest, TypeExpr::TextRest { trim: modifiers.trim }))
        }
        "string" => {
            let (rest, length) = cut(context(
                "string length",
                delimited(sym('['), count_expr, sym(']')),
            ))(rest)?;
            let (rest, encoding) = opt(preceded(
                ws,
                alt((
                    value(StringEncoding::Utf8, keyword("utf8")),
                    value(StringEncoding::Ascii, keyword("ascii")),
                )),
            ))(rest)?;
            Ok((
                rest,
                TypeExpr::BinaryString {
                    length,
                    encoding: encoding.unwrap_or(StringEncoding::Utf8),
                },
            ))
        }
        w => {
            if let Some(kind) = PrimitiveKind::from_keyword(w) {
                let (rest, endianness) = opt(preceded(
                    ws,
                    alt((
                        value(Endianness::Little, keyword("le")),
                        value(Endianness::Big, keyword("be")),
                    )),
                ))(rest)?;
                return Ok((rest, TypeExpr::primitive(kind, endianness)));
            }
            if RESERVED.contains(&w) {
                return failure(input, "type (found a reserved keyword)");
            }
            if params.iter().any(|p| p == w) {
                let (after, _) = ws(rest)?;
                if after.fragment().starts_with('<') {
                    return failure(after, "type parameter without type arguments");
                }
                return Ok((rest, TypeExpr::Param(w.to_string())));
            }
            let (rest, args) = opt(|i| type_args(i, params))(rest)?;
            Ok((
                rest,
                TypeExpr::Reference {
                    name: w.to_string(),
                    args: args.unwrap_or_default(),
                },
            ))
        }
    }
}

fn type_args<'a>(input: Input<'a>, params: &[String]) -> PResult<'a, Vec<TypeExpr>> {
    preceded(
        sym('<'),
        cut(context(
            "type argument list",
            terminated(
                separated_list1(sym(','), |i| type_expr(i, params)),
                sym('>'),
            ),
        )),
    )(input)
}

#[derive(Debug, Default, Clone, Copy)]
struct CaptureModifiers {
    escaped: bool,
    raw: bool,
    trim: bool,
}

/// `escaped` / `raw` / `trim` in any order
fn capture_modifiers(input: Input) -> PResult<CaptureModifiers> {
    let (input, flags) = many0(preceded(
        ws,
        alt((
            value(0u8, keyword("escaped")),
            value(1u8, keyword("raw")),
            value(2u8, keyword("trim")),
        )),
    ))(input)?;
    Ok((
        input,
        CaptureModifiers {
            escaped: flags.contains(&0),
            raw: flags.contains(&1),
            trim: flags.contains(&2),
        },
    ))
}

// ============================================================================
// Expressions
// ============================================================================

fn terminator(input: Input) -> PResult<Terminator> {
    preceded(
        ws,
        alt((
            value(Terminator::End, keyword("end")),
            map(condition, Terminator::Condition),
        )),
    )(input)
}

fn count_expr(input: Input) -> PResult<Expression> {
    preceded(
        ws,
        alt((
            map(integer, |i| Expression::Literal(Literal::Integer(i))),
            map(path_expr, Expression::Path),
        )),
    )(input)
}

fn condition(input: Input) -> PResult<Expression> {
    let (input, left) = preceded(ws, path_expr)(input)?;
    let (input, op) = cut(context("comparison operator", compare_op))(input)?;
    let (input, right) = cut(context("literal", literal))(input)?;
    Ok((input, Expression::Compare { left, op, right }))
}

fn path_expr(input: Input) -> PResult<PathExpr> {
    map(separated_list1(char('.'), path_segment), |segments| {
        PathExpr { segments }
    })(input)
}

fn path_segment(input: Input) -> PResult<PathSegment> {
    let (input, name) = identifier(input)?;
    let (input, index) = opt(delimited(
        pair(ws, char('[')),
        preceded(ws, integer),
        cut(context("']'", sym(']'))),
    ))(input)?;
    Ok((input, PathSegment::new(name.fragment().to_string(), index)))
}

fn compare_op(input: Input) -> PResult<CompareOp> {
    preceded(
        ws,
        alt((
            value(CompareOp::Eq, tag("==")),
            value(CompareOp::Ne, tag("!=")),
            value(CompareOp::Ne, tag("<>")),
            value(CompareOp::Le, tag("<=")),
            value(CompareOp::Ge, tag(">=")),
            value(CompareOp::Eq, tag("=")),
            value(CompareOp::Lt, tag("<")),
            value(CompareOp::Gt, tag(">")),
        )),
    )(input)
}

fn literal(input: Input) -> PResult<Literal> {
    preceded(
        ws,
        alt((
            map(hex_integer, Literal::Integer),
            number_literal,
            map(string_literal, Literal::Text),
        )),
    )(input)
}

fn integer(input: Input) -> PResult<i64> {
    alt((hex_integer, decimal_integer))(input)
}

fn decimal_integer(input: Input) -> PResult<i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: Input| {
        s.fragment().parse::<i64>()
    })(input)
}

fn hex_integer(input: Input) -> PResult<i64> {
    let (rest, (neg, _, digits)) =
        tuple((opt(char('-')), alt((tag("0x"), tag("0X"))), hex_digit1))(input)?;
    match i64::from_str_radix(digits.fragment(), 16) {
        Ok(v) => Ok((rest, if neg.is_some() { -v } else { v })),
        Err(_) => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::HexDigit,
        ))),
    }
}

fn number_literal(input: Input) -> PResult<Literal> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;
    let text = *text.fragment();

    let parsed = if text.contains('.') {
        text.parse::<f64>().ok().map(Literal::Float)
    } else {
        text.parse::<i64>().ok().map(Literal::Integer)
    };
    match parsed {
        Some(lit) => Ok((rest, lit)),
        None => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Digit,
        ))),
    }
}

/// Single- or double-quoted string with backslash escapes
fn string_literal(input: Input) -> PResult<String> {
    preceded(ws, alt((quoted('\''), quoted('"'))))(input)
}

fn quoted<'a>(quote: char) -> impl FnMut(Input<'a>) -> PResult<'a, String> {
    let stop = if quote == '\'' { "\\'" } else { "\\\"" };
    delimited(
        char(quote),
        escaped_transform(
            none_of(stop),
            '\\',
            alt((
                value('\\', char('\\')),
                value('\'', char('\'')),
                value('"', char('"')),
                value('\n', char('n')),
                value('\r', char('r')),
                value('\t', char('t')),
                value('\0', char('0')),
            )),
        ),
        char(quote),
    )
}

// ============================================================================
// Post-parse checks
// ============================================================================

fn check_duplicate_fields(schema: &str, fields: &[FieldDefinition]) -> Result<(), SchemaError> {
    for (i, field) in fields.iter().enumerate() {
        if fields[..i].iter().any(|f| f.name == field.name) {
            return Err(SchemaError::DuplicateField {
                schema: schema.to_string(),
                field: field.name.clone(),
            });
        }
        if let TypeExpr::InlineSchema(inner) = innermost_element(&field.ty) {
            check_duplicate_fields(&format!("{}.{}", schema, field.name), inner)?;
        }
    }
    Ok(())
}

fn innermost_element(ty: &TypeExpr) -> &TypeExpr {
    match ty {
        TypeExpr::FixedArray { element, .. }
        | TypeExpr::RepeatUntilArray { element, .. }
        | TypeExpr::TextRepeat { element, .. } => innermost_element(element),
        other => other,
    }
}

fn lint(source: &str, definitions: &[SchemaDefinition]) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    struct Params(Vec<String>);
    impl TypeVisitor for Params {
        fn visit_param(&mut self, name: &str) {
            self.0.push(name.to_string());
        }
    }

    for def in definitions {
        let mut used = Params(vec![]);
        for field in &def.fields {
            used.visit_type(&field.ty);
        }
        for param in &def.type_params {
            if !used.0.contains(param) {
                out.push(
                    diagnostics::unused_type_parameter(&def.name, param)
                        .with_span(SourceSpan::from_span(source, def.span)),
                );
            }
        }

        lint_fields(source, &def.name, &def.fields, &[], &mut out);
    }

    out
}

fn lint_fields(
    source: &str,
    schema: &str,
    fields: &[FieldDefinition],
    outer: &[&str],
    out: &mut Vec<Diagnostic>,
) {
    for (i, field) in fields.iter().enumerate() {
        let mut visible: Vec<&str> = outer.to_vec();
        visible.extend(fields[..=i].iter().map(|f| f.name.as_str()));
        lint_type(source, schema, field, &field.ty, &visible, out);
    }
}

fn lint_type(
    source: &str,
    schema: &str,
    field: &FieldDefinition,
    ty: &TypeExpr,
    visible: &[&str],
    out: &mut Vec<Diagnostic>,
) {
    let span = || SourceSpan::from_span(source, field.span);
    let check_expr = |expr: &Expression, out: &mut Vec<Diagnostic>| {
        if let Some(root) = expr.path().and_then(|p| p.root()) {
            if !visible.contains(&root.name.as_str()) {
                out.push(
                    diagnostics::outer_scope_path(schema, &field.name, &root.name)
                        .with_span(span()),
                );
            }
        }
    };

    match ty {
        TypeExpr::Primitive(p) if p.kind.width() == 1 && p.endianness.is_some() => {
            out.push(diagnostics::redundant_endianness(schema, &field.name).with_span(span()));
        }
        TypeExpr::FixedArray { element, count } => {
            check_expr(count, out);
            lint_type(source, schema, field, element, visible, out);
        }
        TypeExpr::BinaryString { length, .. } => check_expr(length, out),
        TypeExpr::RepeatUntilArray { element, until } | TypeExpr::TextRepeat { element, until } => {
            if let Terminator::Condition(c) = until {
                check_expr(c, out);
            }
            lint_type(source, schema, field, element, visible, out);
        }
        TypeExpr::InlineSchema(inner) => {
            let nested = format!("{}.{}", schema, field.name);
            lint_fields(source, &nested, inner, visible, out);
        }
        TypeExpr::Reference { args, .. } => {
            for arg in args {
                lint_type(source, schema, field, arg, visible, out);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;

    fn parse_one(source: &str) -> SchemaDefinition {
        let parsed = parse_schemas(source).unwrap();
        assert_eq!(parsed.definitions.len(), 1);
        parsed.definitions.into_iter().next().unwrap()
    }

    #[test]
    fn test_simple_binary_schema() {
        let def = parse_one("binary Item { Value: byte }");
        assert_eq!(def.kind, SchemaKind::Binary);
        assert_eq!(def.name, "Item");
        assert!(def.type_params.is_empty());
        assert_eq!(def.fields.len(), 1);
        assert_eq!(def.fields[0].name, "Value");
        assert_eq!(
            def.fields[0].ty,
            TypeExpr::primitive(PrimitiveKind::Byte, None)
        );
    }

    #[test]
    fn test_primitive_endianness() {
        let def = parse_one("binary H { A: int le, B: ushort be, C: u64, D: double le }");
        assert_eq!(
            def.fields[0].ty,
            TypeExpr::primitive(PrimitiveKind::Int, Some(Endianness::Little))
        );
        assert_eq!(
            def.fields[1].ty,
            TypeExpr::primitive(PrimitiveKind::UShort, Some(Endianness::Big))
        );
        assert_eq!(
            def.fields[2].ty,
            TypeExpr::primitive(PrimitiveKind::ULong, None)
        );
        assert_eq!(
            def.fields[3].ty,
            TypeExpr::primitive(PrimitiveKind::Double, Some(Endianness::Little))
        );
    }

    #[test]
    fn test_generic_schema_params_become_param_nodes() {
        let def = parse_one("binary LengthPrefixed<T> { Length: byte, Data: T[Length] }");
        assert_eq!(def.type_params, vec!["T"]);
        match &def.fields[1].ty {
            TypeExpr::FixedArray { element, count } => {
                assert_eq!(**element, TypeExpr::Param("T".into()));
                assert_eq!(count.to_string(), "Length");
            }
            other => panic!("Expected FixedArray, got {:?}", other),
        }
    }

    #[test]
    fn test_generic_reference_arguments_kept() {
        let def = parse_one("binary Outer { Body: LengthPrefixed<Item> }");
        assert_eq!(
            def.fields[0].ty,
            TypeExpr::Reference {
                name: "LengthPrefixed".into(),
                args: vec![TypeExpr::reference("Item")],
            }
        );
    }

    #[test]
    fn test_nested_generic_arguments() {
        let def = parse_one("binary Pair<A, B> { Left: Wrap<Wrap<A>>, Right: B[2] }");
        assert_eq!(def.fields[0].ty.to_string(), "Wrap<Wrap<A>>");
        assert!(!def.fields[0].ty.is_concrete());
    }

    #[test]
    fn test_inline_schema() {
        let def = parse_one(
            "binary Packet { Header: { Magic: int le, Version: short le }, Payload: byte }",
        );
        match &def.fields[0].ty {
            TypeExpr::InlineSchema(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].name, "Magic");
                assert_eq!(fields[1].name, "Version");
            }
            other => panic!("Expected InlineSchema, got {:?}", other),
        }
        assert_eq!(def.fields[1].name, "Payload");
    }

    #[test]
    fn test_repeat_until_with_dotted_indexed_path() {
        let def = parse_one("binary Stream { Records: Record repeat until Records[-1].Type = 0 }");
        match &def.fields[0].ty {
            TypeExpr::RepeatUntilArray { element, until } => {
                assert_eq!(**element, TypeExpr::reference("Record"));
                let Terminator::Condition(Expression::Compare { left, op, right }) = until else {
                    panic!("Expected condition, got {:?}", until);
                };
                assert_eq!(left.segments[0], PathSegment::new("Records", Some(-1)));
                assert_eq!(left.segments[1], PathSegment::new("Type", None));
                assert_eq!(*op, CompareOp::Eq);
                assert_eq!(*right, Literal::Integer(0));
            }
            other => panic!("Expected RepeatUntilArray, got {:?}", other),
        }
    }

    #[test]
    fn test_repeat_until_end_postfix() {
        let def = parse_one("binary Blob { Bytes: byte repeat until end }");
        assert_eq!(
            def.fields[0].ty,
            TypeExpr::RepeatUntilArray {
                element: Box::new(TypeExpr::primitive(PrimitiveKind::Byte, None)),
                until: Terminator::End,
            }
        );
    }

    #[test]
    fn test_text_forms() {
        let parsed = parse_schemas(
            r#"
            text Pair { Key: until '=', Value: rest }
            text Config { Entries: repeat Pair until end }
            text Quoted { Name: between '"' '"' escaped, Tail: rest trim }
            "#,
        )
        .unwrap();
        let defs = &parsed.definitions;
        assert_eq!(defs.len(), 3);
        assert_eq!(
            defs[0].fields[0].ty,
            TypeExpr::TextUntil {
                delimiter: "=".into(),
                escaped: true,
                trim: false
            }
        );
        assert_eq!(defs[0].fields[1].ty, TypeExpr::TextRest { trim: false });
        assert_eq!(
            defs[1].fields[0].ty,
            TypeExpr::TextRepeat {
                element: Box::new(TypeExpr::reference("Pair")),
                until: Terminator::End,
            }
        );
        assert_eq!(
            defs[2].fields[0].ty,
            TypeExpr::TextBetween {
                open: "\"".into(),
                close: "\"".into(),
                escaped: true,
                trim: false
            }
        );
        assert_eq!(defs[2].fields[1].ty, TypeExpr::TextRest { trim: true });
    }

    #[test]
    fn test_escaped_delimiter_literals() {
        let def = parse_one(r"text T { A: until '\'', B: until '\t' trim raw }");
        assert_eq!(
            def.fields[0].ty,
            TypeExpr::TextUntil {
                delimiter: "'".into(),
                escaped: true,
                trim: false
            }
        );
        assert_eq!(
            def.fields[1].ty,
            TypeExpr::TextUntil {
                delimiter: "\t".into(),
                escaped: false,
                trim: true
            }
        );
    }

    #[test]
    fn test_capture_modifier_placement() {
        assert!(parse_schemas("text A { X: until '=' escaped }").is_err());
        assert!(parse_schemas("text A { X: between '(' ')' raw }").is_err());
        assert!(parse_schemas("text A { X: rest raw }").is_err());
        let def = parse_one("text A { X: until ';' raw }");
        assert_eq!(def.fields[0].ty.to_string(), "until ';' raw");
        let def = parse_one("text A { X: until ';' trim }");
        assert_eq!(def.fields[0].ty.to_string(), "until ';' trim");
    }

    #[test]
    fn test_binary_string_and_hex_count() {
        let def = parse_one("binary Name { Tag: string[0x04] ascii, Label: string[Len] }");
        assert_eq!(
            def.fields[0].ty,
            TypeExpr::BinaryString {
                length: Expression::Literal(Literal::Integer(4)),
                encoding: StringEncoding::Ascii,
            }
        );
        assert_eq!(def.fields[1].ty.to_string(), "string[Len]");
    }

    #[test]
    fn test_multidimensional_array() {
        let def = parse_one("binary Grid { Cells: byte[2][3] }");
        assert_eq!(def.fields[0].ty.to_string(), "byte[2][3]");
    }

    #[test]
    fn test_forward_references_and_comments() {
        let parsed = parse_schemas(
            r#"
            // the outer record is declared first
            binary Outer { Inner: Inner }
            /* and the inner one later */
            binary Inner { X: byte, }
            "#,
        )
        .unwrap();
        assert_eq!(parsed.definitions.len(), 2);
        assert_eq!(parsed.definitions[1].fields.len(), 1);
    }

    #[test]
    fn test_comparison_operators() {
        for (src, op) in [
            ("A = 1", CompareOp::Eq),
            ("A == 1", CompareOp::Eq),
            ("A != 1", CompareOp::Ne),
            ("A <> 1", CompareOp::Ne),
            ("A < 1", CompareOp::Lt),
            ("A <= 1", CompareOp::Le),
            ("A > 1", CompareOp::Gt),
            ("A >= 1", CompareOp::Ge),
        ] {
            match parse_condition(src).unwrap() {
                Expression::Compare { op: parsed, .. } => assert_eq!(parsed, op, "{}", src),
                other => panic!("Expected Compare, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_condition_literals() {
        let cases = [
            ("A = -3", Literal::Integer(-3)),
            ("A = 0xFF", Literal::Integer(255)),
            ("A = 2.5", Literal::Float(2.5)),
            ("A.B = 'end'", Literal::Text("end".into())),
        ];
        for (src, lit) in cases {
            match parse_condition(src).unwrap() {
                Expression::Compare { right, .. } => assert_eq!(right, lit, "{}", src),
                other => panic!("Expected Compare, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_parse_type_reference_entry_point() {
        let ty = parse_type_reference(" LengthPrefixed<Item> ").unwrap();
        assert_eq!(ty.to_string(), "LengthPrefixed<Item>");
    }

    #[test]
    fn test_parse_path() {
        let path = parse_path("Data[1].Value").unwrap();
        assert_eq!(path.segments.len(), 2);
        assert_eq!(path.segments[0].index, Some(1));
    }

    #[test]
    fn test_error_carries_location_and_token() {
        let err = parse_schemas("binary A {\n  X: byte\n  Y: byte\n}").unwrap_err();
        match err {
            SchemaError::Syntax { line, token, .. } => {
                assert_eq!(line, 3);
                assert_eq!(token, "Y:");
            }
            other => panic!("Expected Syntax, got {:?}", other),
        }
    }

    #[test]
    fn test_error_missing_colon() {
        assert!(matches!(
            parse_schemas("binary A { X byte }"),
            Err(SchemaError::Syntax { .. })
        ));
    }

    #[test]
    fn test_error_unknown_schema_kind() {
        assert!(parse_schemas("record A { X: byte }").is_err());
    }

    #[test]
    fn test_error_reserved_keyword_as_type() {
        assert!(parse_schemas("binary A { X: trim }").is_err());
    }

    #[test]
    fn test_error_type_param_with_arguments() {
        assert!(parse_schemas("binary A<T> { X: T<byte> }").is_err());
    }

    #[test]
    fn test_error_unclosed_block() {
        assert!(parse_schemas("binary A { X: byte").is_err());
    }

    #[test]
    fn test_error_empty_delimiter() {
        assert!(parse_schemas("text A { X: until '' }").is_err());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = parse_schemas("binary A { X: byte, X: byte }").unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                schema: "A".into(),
                field: "X".into()
            }
        );
    }

    #[test]
    fn test_diagnostics() {
        let parsed = parse_schemas(
            r#"
            binary Unused<T> { A: byte le, B: byte[Outer] }
            "#,
        )
        .unwrap();
        let codes: Vec<_> = parsed.diagnostics.iter().map(|d| d.code.clone()).collect();
        assert!(codes.contains(&DiagnosticCode::UnusedTypeParameter));
        assert!(codes.contains(&DiagnosticCode::RedundantEndianness));
        assert!(codes.contains(&DiagnosticCode::OuterScopePath));
        assert!(parsed.diagnostics.iter().all(|d| d.span.is_some()));
    }

    #[test]
    fn test_loop_field_may_reference_itself() {
        let parsed =
            parse_schemas("binary S { Records: Record repeat until Records[-1].Type = 0 }")
                .unwrap();
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_empty_source() {
        let parsed = parse_schemas("  // nothing here\n").unwrap();
        assert!(parsed.definitions.is_empty());
    }
}
