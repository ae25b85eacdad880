//! End-to-end decoding through the public API

use pretty_assertions::assert_eq;
use record_dsl::{compile, DecodeError, DecodedValue, RecordView, Scalar};

const BINARY_SCHEMAS: &str = r#"
    // Generic length-prefixed list
    binary Item { Value: byte }
    binary LengthPrefixed<T> { Length: byte, Data: T[Length] }

    binary Packet {
        Header: { Magic: int le, Version: short le },
        Payload: byte,
    }

    binary Record { Type: byte, Value: byte }
    binary Stream { Records: Record repeat until Records[-1].Type = 0 }
"#;

const TEXT_SCHEMAS: &str = r#"
    text Pair { Key: until '=', Value: rest }
    text Config { Entries: repeat Pair until end }

    text Quoted { Text: between '"' '"' escaped, Tail: rest }
"#;

fn byte(v: &DecodedValue) -> u8 {
    match v {
        DecodedValue::Scalar(Scalar::Byte(b)) => *b,
        other => panic!("expected byte, got {:?}", other),
    }
}

#[test]
fn generic_instantiation_decodes_elements_in_order() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let record = compiled
        .decode_binary(&[0x02, 0x0A, 0x14], "LengthPrefixed<Item>")
        .unwrap();
    let view = RecordView::new(&record);

    let data = view.elements("Data").unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0].field("Value").map(byte), Some(0x0A));
    assert_eq!(data[1].field("Value").map(byte), Some(0x14));
    assert_eq!(data[0].as_record().map(|r| r.schema.as_str()), Some("Item"));
}

#[test]
fn inline_schema_fields_reachable_by_dotted_path() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let record = compiled
        .decode_binary(&[0x78, 0x56, 0x34, 0x12, 0x03, 0x00, 0xFF], "Packet")
        .unwrap();
    let view = RecordView::new(&record);

    assert_eq!(view.scalar("Header.Magic").unwrap(), &Scalar::Int(0x12345678));
    assert_eq!(view.scalar("Header.Version").unwrap(), &Scalar::Short(3));
    assert_eq!(view.scalar("Payload").unwrap(), &Scalar::Byte(0xFF));
}

#[test]
fn repeat_until_keeps_terminator() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let record = compiled
        .decode_binary(&[0x01, 0x0A, 0x02, 0x14, 0x00, 0x00], "Stream")
        .unwrap();
    let view = RecordView::new(&record);

    let rows: Vec<_> = view.expand("Records").unwrap().collect();
    assert_eq!(rows.len(), 3);

    // The consuming query filters the terminator out
    let values: Vec<u8> = rows
        .iter()
        .filter_map(|row| row.element_view())
        .filter(|r| r.scalar("Type").ok() != Some(&Scalar::Byte(0)))
        .map(|r| byte(r.get("Value").unwrap()))
        .collect();
    assert_eq!(values, vec![10, 20]);
}

#[test]
fn repeat_until_first_element_yields_single_element() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let record = compiled.decode_binary(&[0x00, 0x07], "Stream").unwrap();
    let view = RecordView::new(&record);
    assert_eq!(view.elements("Records").unwrap().len(), 1);
}

#[test]
fn repeat_until_exhausted_input_is_out_of_bounds() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let err = compiled
        .decode_binary(&[0x01, 0x0A, 0x02, 0x14], "Stream")
        .unwrap_err();
    assert_eq!(
        err,
        DecodeError::OutOfBounds {
            schema: "Stream".into(),
            field: "Records".into(),
            offset: 4,
            detail: "input exhausted after 2 element(s) before 'Records[-1].Type = 0' held".into(),
        }
    );
}

#[test]
fn negative_index_before_any_element_is_condition_error() {
    // The element's own fields look back at the loop array before it has
    // anything in it
    let compiled = compile(
        r#"
        binary Entry { Type: byte, Prev: byte[Records[-1].Type] }
        binary Log { Records: Entry repeat until Records[-1].Type = 0 }
        "#,
    )
    .unwrap();
    let err = compiled.decode_binary(&[0x01, 0x00], "Log").unwrap_err();
    assert!(
        matches!(err, DecodeError::ConditionEvaluation { ref field, .. } if field == "Prev"),
        "unexpected error: {err}"
    );
}

#[test]
fn escaped_between_keeps_backslashes() {
    let compiled = compile(TEXT_SCHEMAS).unwrap();
    let record = compiled
        .decode_text(r#""hello \"world\" end"more"#, "Quoted")
        .unwrap();
    let view = RecordView::new(&record);
    assert_eq!(
        view.scalar("Text").unwrap(),
        &Scalar::Text(r#"hello \"world\" end"#.into())
    );
    assert_eq!(view.scalar("Tail").unwrap(), &Scalar::Text("more".into()));
}

#[test]
fn text_repeat_until_end() {
    let compiled = compile(TEXT_SCHEMAS).unwrap();
    let record = compiled.decode_text("host=localhost", "Config").unwrap();
    let view = RecordView::new(&record);

    let entries = view.elements("Entries").unwrap();
    assert_eq!(entries.len(), 1);
    let pair = RecordView::of(&entries[0]).unwrap();
    assert_eq!(pair.scalar("Key").unwrap(), &Scalar::Text("host".into()));
    assert_eq!(pair.scalar("Value").unwrap(), &Scalar::Text("localhost".into()));
}

#[test]
fn text_repeat_until_end_on_empty_unit() {
    let compiled = compile(TEXT_SCHEMAS).unwrap();
    let record = compiled.decode_text("", "Config").unwrap();
    assert_eq!(record.get("Entries"), Some(&DecodedValue::Array(vec![])));
}

#[test]
fn text_repeat_over_multiple_entries() {
    let compiled = compile(
        r#"
        text Setting { Key: until '=' trim, Value: until ';' trim }
        text Line { Settings: repeat Setting until end }
        "#,
    )
    .unwrap();
    let record = compiled
        .decode_text("a = 1; b = two ;c=3;", "Line")
        .unwrap();
    let view = RecordView::new(&record);
    let keys: Vec<String> = view
        .expand("Settings")
        .unwrap()
        .filter_map(|row| row.element_view())
        .map(|r| r.scalar("Key").unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
}

#[test]
fn decoding_is_pure() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let bytes = [0x01, 0x0A, 0x02, 0x14, 0x00, 0x00];
    let first = compiled.decode_binary(&bytes, "Stream").unwrap();
    let second = compiled.decode_binary(&bytes, "Stream").unwrap();
    assert_eq!(first, second);
}

#[test]
fn decoded_tree_outlives_buffer() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let record = {
        let buffer = vec![0x02, 0x0A, 0x14];
        compiled.decode_binary(&buffer, "LengthPrefixed<Item>").unwrap()
    };
    assert_eq!(RecordView::new(&record).scalar("Length").unwrap(), &Scalar::Byte(2));
}

#[test]
fn parallel_decodes_share_compiled_schemas() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let rows: Vec<Vec<u8>> = (1..=8u8).map(|n| {
        let mut row = vec![n];
        row.extend(std::iter::repeat(n).take(n as usize));
        row
    }).collect();

    let lengths: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = rows
            .iter()
            .map(|row| {
                let compiled = &compiled;
                s.spawn(move || {
                    let record = compiled.decode_binary(row, "LengthPrefixed<Item>").unwrap();
                    RecordView::new(&record).elements("Data").unwrap().len()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(lengths, (1..=8).collect::<Vec<usize>>());
    assert_eq!(compiled.registry().instantiation_count(), 1);
}

#[test]
fn enclosing_scope_supplies_counts() {
    let compiled = compile(
        r#"
        binary Row { Cells: byte[Width] }
        binary Grid { Width: byte, Height: byte, Rows: Row[Height] }
        "#,
    )
    .unwrap();
    let record = compiled
        .decode_binary(&[2, 3, 1, 2, 3, 4, 5, 6], "Grid")
        .unwrap();
    let view = RecordView::new(&record);
    assert_eq!(view.elements("Rows").unwrap().len(), 3);
    assert_eq!(view.scalar("Rows[-1].Cells[1]").unwrap(), &Scalar::Byte(6));
    assert!(compiled
        .diagnostics()
        .iter()
        .any(|d| d.code == record_dsl::DiagnosticCode::OuterScopePath));
}

#[test]
fn json_rendering_of_decoded_record() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let record = compiled
        .decode_binary(&[0x78, 0x56, 0x34, 0x12, 0x03, 0x00, 0xFF], "Packet")
        .unwrap();
    let json = RecordView::new(&record).to_json().unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "Header": { "Magic": 305419896, "Version": 3 },
            "Payload": 255
        })
    );
}

#[test]
fn entry_type_arguments_must_resolve() {
    let compiled = compile(BINARY_SCHEMAS).unwrap();
    let err = compiled
        .decode_binary(&[0x00], "LengthPrefixed<Missing>")
        .unwrap_err();
    assert_eq!(
        err,
        DecodeError::Schema(record_dsl::SchemaError::UnresolvedReference {
            schema: "<entry>".into(),
            field: "LengthPrefixed".into(),
            name: "Missing".into(),
        })
    );
}

#[test]
fn until_skips_backslash_escaped_delimiter() {
    let compiled = compile(TEXT_SCHEMAS).unwrap();
    let record = compiled.decode_text(r"a\=b=c", "Pair").unwrap();
    let view = RecordView::new(&record);
    assert_eq!(view.scalar("Key").unwrap(), &Scalar::Text(r"a\=b".into()));
    assert_eq!(view.scalar("Value").unwrap(), &Scalar::Text("c".into()));
}
