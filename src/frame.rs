//! Typed result tables built from SDS event rows.
//!
//! SDS returns events as JSON objects. A table takes its column set from the
//! keys of the first event and decides each column's type from the first
//! event's value:
//!
//! - a string that reads as a date becomes a [`FieldType::Time`] column
//!   (epoch milliseconds, unparseable values become null)
//! - a boolean becomes a [`FieldType::Boolean`] column
//! - a number, or a string holding one, becomes a [`FieldType::Number`] column
//! - anything else becomes a [`FieldType::Text`] column
//!
//! Later events are checked against that type. Boolean and number columns
//! that meet a value of another type are downgraded to text.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Time,
    Boolean,
    Number,
    #[serde(rename = "string")]
    Text,
}

/// Values of one column, tagged with the column type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values")]
pub enum ColumnValues {
    /// Epoch milliseconds.
    #[serde(rename = "time")]
    Time(Vec<Option<i64>>),
    #[serde(rename = "boolean")]
    Boolean(Vec<Option<bool>>),
    #[serde(rename = "number")]
    Number(Vec<Option<f64>>),
    #[serde(rename = "string")]
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn field_type(&self) -> FieldType {
        match self {
            ColumnValues::Time(_) => FieldType::Time,
            ColumnValues::Boolean(_) => FieldType::Boolean,
            ColumnValues::Number(_) => FieldType::Number,
            ColumnValues::Text(_) => FieldType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Time(v) => v.len(),
            ColumnValues::Boolean(v) => v.len(),
            ColumnValues::Number(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(flatten)]
    pub values: ColumnValues,
}

impl Column {
    pub fn field_type(&self) -> FieldType {
        self.values.field_type()
    }
}

/// The table produced for one query target.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "fields")]
    pub columns: Vec<Column>,
    /// Why the target produced no data, when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultTable {
    /// A table without columns.
    pub fn empty(ref_id: Option<String>) -> Self {
        Self {
            ref_id,
            ..Default::default()
        }
    }

    pub fn failed(ref_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            ref_id,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Builds a table from a response body. Bodies that hold no events
    /// produce an empty table.
    pub fn from_body(ref_id: Option<String>, name: Option<String>, body: Option<&Value>) -> Self {
        let rows: Vec<&Value> = match body {
            Some(Value::Array(rows)) => rows.iter().collect(),
            // first/last/distinct reads answer with a single event
            Some(row @ Value::Object(_)) => vec![row],
            _ => Vec::new(),
        };
        Self::from_rows(ref_id, name, &rows)
    }

    pub fn from_rows(ref_id: Option<String>, name: Option<String>, rows: &[&Value]) -> Self {
        let first = match rows.first().and_then(|row| row.as_object()) {
            Some(first) => first,
            None => return Self::empty(ref_id),
        };

        let columns = first
            .iter()
            .map(|(key, sample)| Column {
                name: key.clone(),
                values: build_column(key, sample, rows),
            })
            .collect();

        Self {
            ref_id,
            name,
            columns,
            error: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Converts the table into an Arrow record batch. `refId` and `name` are
    /// carried in the schema metadata.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut metadata = HashMap::new();
        if let Some(ref_id) = &self.ref_id {
            metadata.insert("refId".to_string(), ref_id.clone());
        }
        if let Some(name) = &self.name {
            metadata.insert("name".to_string(), name.clone());
        }

        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let array: ArrayRef = match &column.values {
                ColumnValues::Time(v) => {
                    Arc::new(TimestampMillisecondArray::from(v.clone()).with_timezone("UTC"))
                }
                ColumnValues::Boolean(v) => Arc::new(BooleanArray::from(v.clone())),
                ColumnValues::Number(v) => Arc::new(Float64Array::from(v.clone())),
                ColumnValues::Text(v) => Arc::new(StringArray::from(v.clone())),
            };
            fields.push(Field::new(&column.name, arrow_type(column.field_type()), true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
        if arrays.is_empty() {
            return Ok(RecordBatch::new_empty(schema));
        }
        Ok(RecordBatch::try_new(schema, arrays)?)
    }
}

fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Time => DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
        FieldType::Boolean => DataType::Boolean,
        FieldType::Number => DataType::Float64,
        FieldType::Text => DataType::Utf8,
    }
}

/// Type of a column, decided from its first value.
pub fn infer_type(sample: &Value) -> FieldType {
    match sample {
        Value::String(s) if parse_timestamp(s).is_some() => FieldType::Time,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) | Value::Null => FieldType::Number,
        Value::String(s) if parse_number(s).is_some() => FieldType::Number,
        _ => FieldType::Text,
    }
}

fn build_column(key: &str, sample: &Value, rows: &[&Value]) -> ColumnValues {
    let cells: Vec<Option<&Value>> = rows
        .iter()
        .map(|row| row.get(key).filter(|v| !v.is_null()))
        .collect();

    let field_type = infer_type(sample);
    let typed = match field_type {
        FieldType::Time => Some(ColumnValues::Time(
            cells
                .iter()
                .map(|cell| cell.and_then(Value::as_str).and_then(parse_timestamp))
                .collect(),
        )),
        FieldType::Boolean => cells
            .iter()
            .map(|cell| match cell {
                None => Some(None),
                Some(v) => v.as_bool().map(Some),
            })
            .collect::<Option<Vec<_>>>()
            .map(ColumnValues::Boolean),
        FieldType::Number => cells
            .iter()
            .map(|cell| match cell {
                None => Some(None),
                Some(Value::Number(n)) => n.as_f64().map(Some),
                Some(Value::String(s)) => parse_number(s).map(Some),
                Some(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(ColumnValues::Number),
        FieldType::Text => None,
    };

    typed.unwrap_or_else(|| {
        if field_type != FieldType::Text {
            warn!(column = key, inferred = ?field_type, "mixed value types, reading column as text");
        }
        ColumnValues::Text(cells.iter().map(|cell| cell.map(text_of)).collect())
    })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric reading of a string; blank and NaN strings are not numbers.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
}

const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Epoch milliseconds of a date or date-time string.
///
/// Accepts RFC 3339, RFC 2822 and ISO 8601 style dates and date-times.
/// Values without an offset are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}
