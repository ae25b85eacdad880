//! Projection bridge
//!
//! Read-only view a host query engine uses to turn a decoded record into
//! rows: scalar fields become columns in schema order, array fields become
//! sub-relations that a row-expansion operator multiplies out while the
//! rest of the record is held constant.

use serde::Serialize;

use crate::ast::PathExpr;
use crate::error::SchemaError;
use crate::expr::{resolve_path, BindingContext, EvalError, Resolved};
use crate::parser::parse_path;
use crate::value::{DecodedValue, Record, Scalar};

/// Failure to project a path
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error(transparent)]
    Path(#[from] SchemaError),

    #[error("{0}")]
    Lookup(String),

    #[error("'{path}' is {found}, expected {expected}")]
    Shape {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Borrowed view over a decoded record
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    record: &'a Record,
}

impl<'a> RecordView<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    /// View over a value that must be a record
    pub fn of(value: &'a DecodedValue) -> Option<Self> {
        value.as_record().map(Self::new)
    }

    pub fn record(&self) -> &'a Record {
        self.record
    }

    pub fn schema(&self) -> &'a str {
        &self.record.schema
    }

    /// Dotted path access: `Header.Magic`, `Data[1].Value`, `Records[-1]`
    pub fn get(&self, path: &str) -> Result<&'a DecodedValue, ProjectionError> {
        let parsed = parse_path(path)?;
        self.get_path(&parsed)
    }

    pub fn get_path(&self, path: &PathExpr) -> Result<&'a DecodedValue, ProjectionError> {
        let ctx = BindingContext::root(&self.record.fields);
        match resolve_path(path, &ctx) {
            Ok(Resolved::Value(v)) => Ok(v),
            // Only loop scopes produce `Items`, and a root view has none
            Ok(Resolved::Items(_)) => Err(ProjectionError::Lookup(format!(
                "'{}' does not name a value",
                path
            ))),
            Err(EvalError::ConditionEvaluation(reason)) | Err(EvalError::TypeMismatch(reason)) => {
                Err(ProjectionError::Lookup(reason))
            }
        }
    }

    /// Scalar at a path
    pub fn scalar(&self, path: &str) -> Result<&'a Scalar, ProjectionError> {
        let value = self.get(path)?;
        value.as_scalar().ok_or_else(|| ProjectionError::Shape {
            path: path.to_string(),
            expected: "a scalar",
            found: value.kind_name(),
        })
    }

    /// Top-level scalar fields in schema order
    pub fn columns(&self) -> Vec<(&'a str, &'a Scalar)> {
        self.record
            .fields
            .iter()
            .filter_map(|(name, v)| v.as_scalar().map(|s| (name.as_str(), s)))
            .collect()
    }

    /// Scalars of this record and its nested records, named by dotted path
    ///
    /// Arrays are skipped; they are expanded, not flattened.
    pub fn flatten_columns(&self) -> Vec<(String, &'a Scalar)> {
        let mut out = Vec::new();
        flatten_into(self.record, "", &mut out);
        out
    }

    /// Names of array-valued fields in schema order
    pub fn array_fields(&self) -> Vec<&'a str> {
        self.record
            .fields
            .iter()
            .filter(|(_, v)| matches!(v, DecodedValue::Array(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Elements of an array field
    pub fn elements(&self, path: &str) -> Result<&'a [DecodedValue], ProjectionError> {
        let value = self.get(path)?;
        value.as_array().ok_or_else(|| ProjectionError::Shape {
            path: path.to_string(),
            expected: "an array",
            found: value.kind_name(),
        })
    }

    /// One row per element of `path`, each pairing the element with this record
    pub fn expand(&self, path: &str) -> Result<impl Iterator<Item = ExpandedRow<'a>> + 'a, ProjectionError> {
        let parent = *self;
        let elements = self.elements(path)?;
        Ok(elements
            .iter()
            .enumerate()
            .map(move |(index, element)| ExpandedRow {
                parent,
                index,
                element,
            }))
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.record)
    }
}

fn flatten_into<'a>(record: &'a Record, prefix: &str, out: &mut Vec<(String, &'a Scalar)>) {
    for (name, value) in &record.fields {
        let column = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        match value {
            DecodedValue::Scalar(s) => out.push((column, s)),
            DecodedValue::Record(inner) => flatten_into(inner, &column, out),
            DecodedValue::Array(_) => {}
        }
    }
}

/// A parent record held constant next to one element of one of its arrays
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExpandedRow<'a> {
    #[serde(serialize_with = "serialize_view")]
    pub parent: RecordView<'a>,
    pub index: usize,
    pub element: &'a DecodedValue,
}

fn serialize_view<S: serde::Serializer>(view: &RecordView<'_>, serializer: S) -> Result<S::Ok, S::Error> {
    view.record.serialize(serializer)
}

impl<'a> ExpandedRow<'a> {
    /// View over the element when it is a record
    pub fn element_view(&self) -> Option<RecordView<'a>> {
        RecordView::of(self.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(value: u8) -> DecodedValue {
        DecodedValue::Record(Record::new("Item", vec![("Value".into(), Scalar::Byte(value).into())]))
    }

    fn sample() -> Record {
        Record::new(
            "Packet",
            vec![
                (
                    "Header".into(),
                    DecodedValue::Record(Record::new(
                        "Packet.Header",
                        vec![
                            ("Magic".into(), Scalar::Int(0x12345678).into()),
                            ("Version".into(), Scalar::Short(3).into()),
                        ],
                    )),
                ),
                ("Length".into(), Scalar::Byte(2).into()),
                ("Data".into(), DecodedValue::Array(vec![item(10), item(20)])),
                ("Payload".into(), Scalar::Byte(0xFF).into()),
            ],
        )
    }

    #[test]
    fn test_dotted_access() {
        let record = sample();
        let view = RecordView::new(&record);
        assert_eq!(view.scalar("Header.Magic").unwrap(), &Scalar::Int(0x12345678));
        assert_eq!(view.scalar("Data[1].Value").unwrap(), &Scalar::Byte(20));
        assert_eq!(view.scalar("Data[-2].Value").unwrap(), &Scalar::Byte(10));
    }

    #[test]
    fn test_bad_paths() {
        let record = sample();
        let view = RecordView::new(&record);
        assert!(matches!(view.get("Nope"), Err(ProjectionError::Lookup(_))));
        assert!(matches!(view.get("Data[5]"), Err(ProjectionError::Lookup(_))));
        assert!(matches!(view.get("Data[["), Err(ProjectionError::Path(_))));
        assert!(matches!(
            view.scalar("Header"),
            Err(ProjectionError::Shape { found: "record", .. })
        ));
    }

    #[test]
    fn test_columns_follow_schema_order() {
        let record = sample();
        let view = RecordView::new(&record);
        let names: Vec<&str> = view.columns().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Length", "Payload"]);

        let flat: Vec<String> = view.flatten_columns().into_iter().map(|(n, _)| n).collect();
        assert_eq!(flat, vec!["Header.Magic", "Header.Version", "Length", "Payload"]);
        assert_eq!(view.array_fields(), vec!["Data"]);
    }

    #[test]
    fn test_expand_holds_parent_constant() {
        let record = sample();
        let view = RecordView::new(&record);
        let rows: Vec<ExpandedRow> = view.expand("Data").unwrap().collect();
        assert_eq!(rows.len(), 2);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.index, i);
            assert_eq!(row.parent.scalar("Payload").unwrap(), &Scalar::Byte(0xFF));
        }
        let second = rows[1].element_view().unwrap();
        assert_eq!(second.scalar("Value").unwrap(), &Scalar::Byte(20));

        assert!(matches!(
            view.expand("Length"),
            Err(ProjectionError::Shape { expected: "an array", .. })
        ));
    }

    #[test]
    fn test_json_shape() {
        let record = sample();
        let json = RecordView::new(&record).to_json().unwrap();
        assert_eq!(json["Header"]["Version"], serde_json::json!(3));
        assert_eq!(json["Data"][1]["Value"], serde_json::json!(20));
    }
}
