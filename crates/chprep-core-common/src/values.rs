//! Insert-ready value model.
//!
//! JSON cannot carry a `NaN`, a typed UUID or a calendar date, all of which the
//! store expects, so prepared rows use [`CellValue`] rather than raw JSON.

use std::fmt;

use anyhow::{Result, ensure};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A single insert-ready value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// SQL `NULL`
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer that does not fit an `i64`
    UInt(u64),
    /// Floating point value, `NaN` included
    Float(f64),
    /// Text value
    String(String),
    /// UUID value
    Uuid(Uuid),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time, UTC
    DateTime(NaiveDateTime),
    /// Array value
    Array(Vec<CellValue>),
    /// Map value, insertion ordered
    Map(IndexMap<String, CellValue>),
}

impl CellValue {
    /// Returns `true` if this is a `Float` holding `NaN`.
    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, CellValue::Float(f) if f.is_nan())
    }
}

impl From<JsonValue> for CellValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => CellValue::Null,
            JsonValue::Bool(b) => CellValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CellValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    CellValue::UInt(u)
                } else {
                    CellValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            },
            JsonValue::String(s) => CellValue::String(s),
            JsonValue::Array(items) => {
                CellValue::Array(items.into_iter().map(CellValue::from).collect())
            },
            JsonValue::Object(entries) => CellValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, CellValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::UInt(u) => write!(f, "{u}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            CellValue::Uuid(u) => write!(f, "'{u}'"),
            CellValue::Date(d) => write!(f, "'{}'", d.format("%Y-%m-%d")),
            CellValue::DateTime(dt) => write!(f, "'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            CellValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            },
            CellValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}': {value}", key.replace('\'', "\\'"))?;
                }
                write!(f, "}}")
            },
        }
    }
}

/// A column-oriented batch: column name to one value per row.
///
/// Every column holds exactly [`ColumnBatch::num_rows`] values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnBatch {
    num_rows: usize,
    columns: IndexMap<String, Vec<CellValue>>,
}

impl ColumnBatch {
    /// Creates an empty batch for `num_rows` rows.
    #[must_use]
    pub fn new(num_rows: usize) -> Self {
        Self {
            num_rows,
            columns: IndexMap::new(),
        }
    }

    /// Appends (or replaces) a column.
    ///
    /// # Errors
    ///
    /// Returns an error if the column length differs from the batch row count.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<CellValue>) -> Result<()> {
        let name = name.into();
        ensure!(
            values.len() == self.num_rows,
            "column '{name}' has {} values, batch has {} rows",
            values.len(),
            self.num_rows
        );
        self.columns.insert(name, values);
        Ok(())
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the batch has no rows or no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0 || self.columns.is_empty()
    }

    /// Values of a column, if present.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[CellValue]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_json_values() {
        let value = CellValue::from(json!({"a": [1, "x", null], "b": 1.5, "c": u64::MAX}));
        let CellValue::Map(entries) = value else {
            panic!("expected a map");
        };
        assert_eq!(
            entries["a"],
            CellValue::Array(vec![
                CellValue::Int(1),
                CellValue::String("x".to_string()),
                CellValue::Null
            ])
        );
        assert_eq!(entries["b"], CellValue::Float(1.5));
        assert_eq!(entries["c"], CellValue::UInt(u64::MAX));
    }

    #[test]
    fn batch_rejects_misaligned_columns() {
        let mut batch = ColumnBatch::new(2);
        batch
            .push_column("a", vec![CellValue::Int(1), CellValue::Int(2)])
            .unwrap();
        let err = batch.push_column("b", vec![CellValue::Null]).unwrap_err();
        assert!(err.to_string().contains("column 'b' has 1 values"));
        assert_eq!(batch.num_columns(), 1);
        assert_eq!(batch.column_names().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn display_renders_literals() {
        let value = CellValue::Array(vec![
            CellValue::String("it's".to_string()),
            CellValue::Uuid(Uuid::nil()),
        ]);
        assert_eq!(
            value.to_string(),
            "['it\\'s', '00000000-0000-0000-0000-000000000000']"
        );

        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(CellValue::Date(day).to_string(), "'2024-05-01'");
        let at = day.and_hms_milli_opt(10, 0, 0, 250).unwrap();
        assert_eq!(CellValue::DateTime(at).to_string(), "'2024-05-01 10:00:00.250'");
        let at = day.and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(CellValue::DateTime(at).to_string(), "'2024-05-01 10:00:00'");
    }
}
