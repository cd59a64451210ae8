//! Purpose: Convert between JSON table documents and in-memory tabular sources.
//! Exports: `parse_document`, `value_json`, `column_json`.
//! Role: Input side of `tabwire encode`, output side of `tabwire inspect`.
//! Invariants: Bytes are lowercase hex, timestamps RFC 3339, durations integer nanoseconds.
//! Invariants: Decimals and guids are strings so no precision is lost.
use serde::Deserialize;
use serde_json::{json, Value as Json};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use tabwire::api::{
    ColumnDescriptor, Decimal, Error, ErrorKind, LogicalKind, MemoryResult, MemorySource, Value,
};

#[derive(Debug, Deserialize)]
struct TableDocument {
    #[serde(default = "unknown_records_affected")]
    records_affected: i32,
    results: Vec<ResultDocument>,
}

#[derive(Debug, Deserialize)]
struct ResultDocument {
    columns: Vec<ColumnDocument>,
    #[serde(default)]
    rows: Vec<Vec<Json>>,
}

#[derive(Debug, Deserialize)]
struct ColumnDocument {
    name: String,
    kind: String,
}

fn unknown_records_affected() -> i32 {
    -1
}

fn usage(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Usage).with_message(message)
}

pub fn parse_document(text: &str) -> Result<MemorySource, Error> {
    let document: TableDocument = serde_json::from_str(text)
        .map_err(|err| usage("input is not a valid table document").with_source(err))?;

    let mut results = Vec::with_capacity(document.results.len());
    for (index, result_doc) in document.results.into_iter().enumerate() {
        let mut kinds = Vec::with_capacity(result_doc.columns.len());
        let mut result = MemoryResult::new();
        for column in result_doc.columns {
            let kind = LogicalKind::from_name(&column.kind).ok_or_else(|| {
                usage(format!(
                    "result {index}: unknown kind '{}' for column '{}'",
                    column.kind, column.name
                ))
            })?;
            result = result.column_of(column.name, kind.runtime_type());
            kinds.push(kind);
        }
        for (row_index, row) in result_doc.rows.into_iter().enumerate() {
            if row.len() != kinds.len() {
                return Err(usage(format!(
                    "result {index} row {row_index}: expected {} values, found {}",
                    kinds.len(),
                    row.len()
                )));
            }
            let values = row
                .iter()
                .zip(&kinds)
                .enumerate()
                .map(|(ordinal, (json, kind))| {
                    json_value(json, *kind).map_err(|err| {
                        err.with_message(format!(
                            "result {index} row {row_index}: value is not a valid {kind}"
                        ))
                        .with_ordinal(ordinal)
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            result = result.row(values)?;
        }
        results.push(result);
    }
    Ok(MemorySource::new(results).with_records_affected(document.records_affected))
}

fn json_value(json: &Json, kind: LogicalKind) -> Result<Value, Error> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    let invalid = || usage(format!("value {json} is not a valid {kind}"));
    let text = || json.as_str().ok_or_else(invalid);
    let value = match kind {
        LogicalKind::Boolean => Value::Boolean(json.as_bool().ok_or_else(invalid)?),
        LogicalKind::Byte => Value::Byte(integer(json).ok_or_else(invalid)?),
        LogicalKind::ByteSequence => Value::ByteSequence(decode_hex(text()?).ok_or_else(invalid)?),
        LogicalKind::Char => {
            let mut chars = text()?.chars();
            match (chars.next(), chars.next()) {
                (Some(value), None) => Value::Char(value),
                _ => return Err(invalid()),
            }
        }
        LogicalKind::CharSequence => Value::CharSequence(text()?.chars().collect()),
        LogicalKind::Timestamp => Value::Timestamp(
            OffsetDateTime::parse(text()?, &Rfc3339).map_err(|err| invalid().with_source(err))?,
        ),
        LogicalKind::FixedPoint => {
            let digits = match json {
                Json::Number(number) => number.to_string(),
                _ => text()?.to_string(),
            };
            Value::FixedPoint(digits.parse::<Decimal>().map_err(|_| invalid())?)
        }
        LogicalKind::Double => Value::Double(json.as_f64().ok_or_else(invalid)?),
        LogicalKind::Single => Value::Single(json.as_f64().ok_or_else(invalid)? as f32),
        LogicalKind::Guid => {
            Value::Guid(Uuid::parse_str(text()?).map_err(|err| invalid().with_source(err))?)
        }
        LogicalKind::Int32 => Value::Int32(integer(json).ok_or_else(invalid)?),
        LogicalKind::Int64 => Value::Int64(integer(json).ok_or_else(invalid)?),
        LogicalKind::Int16 => Value::Int16(integer(json).ok_or_else(invalid)?),
        LogicalKind::Text => Value::Text(text()?.to_string()),
        LogicalKind::Duration => Value::Duration(Duration::nanoseconds(
            json.as_i64().ok_or_else(invalid)?,
        )),
    };
    Ok(value)
}

fn integer<T: TryFrom<i64>>(json: &Json) -> Option<T> {
    json.as_i64().and_then(|value| T::try_from(value).ok())
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn value_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(v) => json!(v),
        Value::Byte(v) => json!(v),
        Value::ByteSequence(v) => json!(encode_hex(v)),
        Value::Char(v) => json!(v.to_string()),
        Value::CharSequence(v) => json!(v.iter().collect::<String>()),
        Value::Timestamp(v) => v
            .format(&Rfc3339)
            .map(Json::String)
            .unwrap_or_else(|_| json!(v.to_string())),
        Value::FixedPoint(v) => json!(v.to_string()),
        Value::Double(v) => json!(v),
        Value::Single(v) => json!(f64::from(*v)),
        Value::Guid(v) => json!(v.hyphenated().to_string()),
        Value::Int32(v) => json!(v),
        Value::Int64(v) => json!(v),
        Value::Int16(v) => json!(v),
        Value::Text(v) => json!(v),
        Value::Duration(v) => match i64::try_from(v.whole_nanoseconds()) {
            Ok(nanos) => json!(nanos),
            Err(_) => json!(v.whole_nanoseconds().to_string()),
        },
    }
}

pub fn column_json(column: &ColumnDescriptor) -> Json {
    json!({ "name": column.name(), "kind": column.kind().name() })
}
