//! Utility functions and extension traits for query results and input records.
//!
//! Aggregate results arrive as JSON values whose exact representation depends on
//! the transport: 64-bit counts are often quoted, dates are strings, arrays may be
//! nested. These helpers read them without caring which form was used.

use serde_json::Value as JsonValue;

/// Extension trait for reading aggregate results out of [`JsonValue`]s.
///
/// # Examples
///
/// ```
/// use chprep_core::utils::JsonValueExt;
/// use serde_json::json;
///
/// assert_eq!(json!(42).as_count(), Some(42));
/// assert_eq!(json!("42").as_count(), Some(42));
/// assert_eq!(json!("2024-01-01").to_display_string(), "2024-01-01");
/// assert_eq!(json!(["b", 1, null]).to_string_list(), vec!["b", "1", ""]);
/// ```
pub trait JsonValueExt {
    /// Reads a non-negative count, from a number or a numeric string.
    fn as_count(&self) -> Option<u64>;

    /// Reads a finite float, from a number or a numeric string.
    fn as_float(&self) -> Option<f64>;

    /// Renders the value for display: strings unquoted, `null` as empty.
    fn to_display_string(&self) -> String;

    /// Reads a list of display strings; a scalar becomes a one-element list.
    ///
    /// Nested arrays are flattened.
    fn to_string_list(&self) -> Vec<String>;

    /// Returns `true` for `null`, `[]` and `{}`.
    fn is_absent(&self) -> bool;

    /// Returns `true` for `null`, `""`, `[]` and `{}`.
    fn is_null_or_empty(&self) -> bool;
}

impl JsonValueExt for JsonValue {
    fn as_count(&self) -> Option<u64> {
        match self {
            JsonValue::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        let value = match self {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        value.filter(|f: &f64| f.is_finite())
    }

    fn to_display_string(&self) -> String {
        match self {
            JsonValue::Null => String::new(),
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn to_string_list(&self) -> Vec<String> {
        match self {
            JsonValue::Null => Vec::new(),
            JsonValue::Array(items) => items
                .iter()
                .flat_map(|item| match item {
                    JsonValue::Array(_) => item.to_string_list(),
                    other => vec![other.to_display_string()],
                })
                .collect(),
            other => vec![other.to_display_string()],
        }
    }

    fn is_absent(&self) -> bool {
        match self {
            JsonValue::Null => true,
            JsonValue::Array(items) => items.is_empty(),
            JsonValue::Object(entries) => entries.is_empty(),
            _ => false,
        }
    }

    fn is_null_or_empty(&self) -> bool {
        self.is_absent() || matches!(self, JsonValue::String(s) if s.is_empty())
    }
}

/// Describes a JSON value's type for error messages.
#[must_use]
pub fn describe_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => format!("boolean {b}"),
        JsonValue::Number(n) => format!("number {n}"),
        JsonValue::String(s) => format!("string {s:?}"),
        JsonValue::Array(items) => format!("array of {} item(s)", items.len()),
        JsonValue::Object(entries) => format!("object with {} key(s)", entries.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_count() {
        assert_eq!(json!(0).as_count(), Some(0));
        assert_eq!(json!(12.0).as_count(), Some(12));
        assert_eq!(json!(" 7 ").as_count(), Some(7));
        assert_eq!(json!(-1).as_count(), None);
        assert_eq!(json!(1.5).as_count(), None);
        assert_eq!(json!("abc").as_count(), None);
        assert_eq!(JsonValue::Null.as_count(), None);
    }

    #[test]
    fn test_as_float() {
        assert_eq!(json!(2.5).as_float(), Some(2.5));
        assert_eq!(json!("3").as_float(), Some(3.0));
        assert_eq!(json!("nan").as_float(), None);
        assert_eq!(json!(true).as_float(), None);
    }

    #[test]
    fn test_to_string_list_flattens() {
        assert_eq!(
            json!([["a", "b"], ["c"]]).to_string_list(),
            vec!["a", "b", "c"]
        );
        assert_eq!(json!("solo").to_string_list(), vec!["solo"]);
        assert!(JsonValue::Null.to_string_list().is_empty());
    }

    #[test]
    fn test_null_or_empty() {
        assert!(json!(null).is_null_or_empty());
        assert!(json!("").is_null_or_empty());
        assert!(json!([]).is_null_or_empty());
        assert!(json!({}).is_null_or_empty());
        assert!(!json!(0).is_null_or_empty());
        assert!(!json!(false).is_null_or_empty());

        assert!(json!({}).is_absent());
        assert!(!json!("").is_absent());
    }

    #[test]
    fn test_describe_json() {
        assert_eq!(describe_json(&json!("x")), "string \"x\"");
        assert_eq!(describe_json(&json!([1, 2])), "array of 2 item(s)");
    }
}
