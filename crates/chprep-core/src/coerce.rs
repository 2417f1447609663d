//! Null-safe value coercion.
//!
//! Converts one JSON value into the [`CellValue`] a column accepts, substituting
//! type defaults for nulls and malformed values:
//!
//! | column | null / wrong shape | bad element |
//! |---|---|---|
//! | Map | `{}` | |
//! | Array of String | `[]` | null → `""` |
//! | Array of Number | `[]` | non-numeric → `NaN` (float types) or `0` |
//! | Array of UUID | `[]` | null or unparseable → nil UUID |
//! | Array of Date | `[]` | null or unparseable → `NULL` (nullable) or epoch |
//! | required String | `""` | |
//! | required Number | `0` | |
//! | required Boolean | `false` | |
//! | required UUID | nil UUID | |
//! | required Date | epoch | |
//!
//! Date values are ISO 8601 strings. `Date` columns keep the calendar day only, so a
//! time part after `T` is dropped. A required Number, Boolean, UUID or Date holding
//! a value that cannot be converted is an error. Non-required scalars fall back to
//! `NULL`.

use chprep_core_common::CellValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::classify::{StructuralKind, ValueKind};
use crate::error::CoercionError;
use crate::schema::ColumnDescriptor;
use crate::type_grammar::TypeNode;
use crate::utils::describe_json;

/// Accepted date-time layouts besides RFC 3339.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Coerces a value for a column.
///
/// # Errors
///
/// Returns [`CoercionError::Unconvertible`] if the column is a required Number,
/// Boolean, UUID or Date and the value cannot be converted.
///
/// # Examples
///
/// ```
/// use chprep_core::coerce::coerce_value;
/// use chprep_core::schema::resolve;
/// use chprep_core_common::{CellValue, DescribedColumn};
/// use serde_json::Value;
///
/// let schema = resolve(&[DescribedColumn::new("title", "String")]).unwrap();
/// let title = schema.column("title").unwrap();
/// assert_eq!(
///     coerce_value(title, Value::Null).unwrap(),
///     CellValue::String(String::new())
/// );
/// ```
pub fn coerce_value(column: &ColumnDescriptor, value: JsonValue) -> Result<CellValue, CoercionError> {
    match column.structural_kind {
        StructuralKind::Map => Ok(coerce_map(value)),
        kind if kind.is_array_like() => Ok(coerce_array(column, value)),
        _ => coerce_scalar(column, value),
    }
}

fn coerce_map(value: JsonValue) -> CellValue {
    match value {
        JsonValue::Object(entries) => CellValue::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key, CellValue::from(value)))
                .collect(),
        ),
        _ => CellValue::Map(IndexMap::new()),
    }
}

fn coerce_array(column: &ColumnDescriptor, value: JsonValue) -> CellValue {
    let JsonValue::Array(items) = value else {
        return CellValue::Array(Vec::new());
    };
    let element = column.type_node.args().first();
    let element_type = element.map_or("", |node| node.data_type.as_str());
    let nullable = element.is_some_and(TypeNode::is_nullable);

    let items = items
        .into_iter()
        .map(|item| match column.value_kind {
            ValueKind::String => match item {
                JsonValue::Null => CellValue::String(String::new()),
                other => string_cell(other),
            },
            ValueKind::Number => number_cell(&item).unwrap_or_else(|| {
                if is_float_type(element_type) {
                    CellValue::Float(f64::NAN)
                } else {
                    CellValue::Int(0)
                }
            }),
            ValueKind::Uuid => CellValue::Uuid(parse_uuid(&item).unwrap_or_else(Uuid::nil)),
            ValueKind::Date => date_cell(element_type, &item).unwrap_or_else(|| {
                if nullable {
                    CellValue::Null
                } else {
                    epoch_cell(element_type)
                }
            }),
            ValueKind::Boolean | ValueKind::Other => CellValue::from(item),
        })
        .collect();
    CellValue::Array(items)
}

fn coerce_scalar(column: &ColumnDescriptor, value: JsonValue) -> Result<CellValue, CoercionError> {
    if value.is_null() {
        return Ok(if column.required {
            default_for(column)
        } else {
            CellValue::Null
        });
    }

    let converted = match column.value_kind {
        ValueKind::String => Some(string_cell(value.clone())),
        ValueKind::Number => number_cell(&value),
        ValueKind::Boolean => bool_cell(&value),
        ValueKind::Uuid => match &value {
            JsonValue::String(s) if s.is_empty() => {
                return Ok(if column.required {
                    CellValue::Uuid(Uuid::nil())
                } else {
                    CellValue::Null
                });
            },
            other => parse_uuid(other).map(CellValue::Uuid),
        },
        ValueKind::Date => date_cell(&column.type_node.data_type, &value),
        ValueKind::Other => Some(CellValue::from(value.clone())),
    };

    match converted {
        Some(cell) => Ok(cell),
        None if column.required => Err(CoercionError::Unconvertible {
            column: column.name.clone(),
            expected: column.value_kind.to_string(),
            found: describe_json(&value),
        }),
        None => Ok(CellValue::Null),
    }
}

/// Default for a required scalar column receiving null.
fn default_for(column: &ColumnDescriptor) -> CellValue {
    match column.value_kind {
        ValueKind::String => CellValue::String(String::new()),
        ValueKind::Number if is_float_type(&column.type_node.data_type) => CellValue::Float(0.0),
        ValueKind::Number => CellValue::Int(0),
        ValueKind::Boolean => CellValue::Bool(false),
        ValueKind::Uuid => CellValue::Uuid(Uuid::nil()),
        ValueKind::Date => epoch_cell(&column.type_node.data_type),
        ValueKind::Other => CellValue::Null,
    }
}

/// `date` and `date32` hold a calendar day; the `datetime` family holds an instant.
fn is_day_type(data_type: &str) -> bool {
    matches!(data_type, "date" | "date32")
}

fn epoch_cell(data_type: &str) -> CellValue {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    if is_day_type(data_type) {
        CellValue::Date(epoch.date_naive())
    } else {
        CellValue::DateTime(epoch.naive_utc())
    }
}

fn date_cell(data_type: &str, value: &JsonValue) -> Option<CellValue> {
    let JsonValue::String(s) = value else {
        return None;
    };
    let s = s.trim();
    if is_day_type(data_type) {
        parse_date(s).map(CellValue::Date)
    } else {
        parse_datetime(s).map(CellValue::DateTime)
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.split_once('T').map_or(s, |(day, _)| day);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(s).map(|at| at.date()))
}

/// Parses an ISO 8601 date-time; offsets are converted to UTC and a bare date
/// means midnight.
fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
        })
}

fn is_float_type(data_type: &str) -> bool {
    ["float", "double", "decimal"]
        .iter()
        .any(|name| data_type.contains(name))
}

fn string_cell(value: JsonValue) -> CellValue {
    match value {
        JsonValue::String(s) => CellValue::String(s),
        other => CellValue::String(other.to_string()),
    }
}

fn number_cell(value: &JsonValue) -> Option<CellValue> {
    match value {
        JsonValue::Number(_) => Some(CellValue::from(value.clone())),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(CellValue::Int)
                .or_else(|_| s.parse::<u64>().map(CellValue::UInt))
                .or_else(|_| s.parse::<f64>().map(CellValue::Float))
                .ok()
        },
        _ => None,
    }
}

fn bool_cell(value: &JsonValue) -> Option<CellValue> {
    match value {
        JsonValue::Bool(b) => Some(CellValue::Bool(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(0) => Some(CellValue::Bool(false)),
            Some(1) => Some(CellValue::Bool(true)),
            _ => None,
        },
        JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Some(CellValue::Bool(true)),
            "false" | "0" => Some(CellValue::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn parse_uuid(value: &JsonValue) -> Option<Uuid> {
    match value {
        JsonValue::String(s) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    }
}
