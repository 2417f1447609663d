//! Structural and semantic classification of columns.
//!
//! A column's structural kind decides how it is profiled and how its values are
//! coerced; its value kind is a coarse semantic category derived from the root
//! type name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClassificationError;
use crate::type_grammar::{TypeNode, TypeShape, parse_type};

/// Structural shape of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructuralKind {
    /// Plain scalar column
    Basic,
    /// Array-typed column
    Array,
    /// Map-typed column
    Map,
    /// Dotted scalar column; shares a name prefix with its family by convention only
    Grouped,
    /// Dotted array column; a member of a family of parallel arrays
    Nested,
}

impl StructuralKind {
    /// Returns the display name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StructuralKind::Basic => "Basic",
            StructuralKind::Array => "Array",
            StructuralKind::Map => "Map",
            StructuralKind::Grouped => "Grouped",
            StructuralKind::Nested => "Nested",
        }
    }

    /// Returns `true` for kinds whose values are arrays.
    #[must_use]
    pub fn is_array_like(&self) -> bool {
        matches!(self, StructuralKind::Array | StructuralKind::Nested)
    }
}

impl fmt::Display for StructuralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic category of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Strings, fixed strings and enums
    String,
    /// Integers, floats and decimals
    Number,
    /// Dates and date-times
    Date,
    /// UUIDs
    Uuid,
    /// Booleans
    Boolean,
    /// Anything else
    Other,
}

impl ValueKind {
    /// Returns the display name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "String",
            ValueKind::Number => "Number",
            ValueKind::Date => "Date",
            ValueKind::Uuid => "UUID",
            ValueKind::Boolean => "Boolean",
            ValueKind::Other => "Other",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Structural shape
    pub structural_kind: StructuralKind,
    /// Kind of the values (array elements, map values)
    pub value_kind: ValueKind,
    /// Kind of the map keys; `Some` only for maps
    pub key_kind: Option<ValueKind>,
    /// The parsed type tree
    pub node: TypeNode,
}

/// Maps a root type name to its value kind.
///
/// Substring based, first match wins: `string`/`fixedstring`/`enum`, then
/// `int`/`float`/`decimal`/`double`/`uint`, then `date`/`datetime`, `uuid`, `bool`.
///
/// # Examples
///
/// ```
/// use chprep_core::classify::{ValueKind, resolve_value_kind};
///
/// assert_eq!(resolve_value_kind("LowCardinality"), ValueKind::Other);
/// assert_eq!(resolve_value_kind("Enum8"), ValueKind::String);
/// assert_eq!(resolve_value_kind("UInt64"), ValueKind::Number);
/// assert_eq!(resolve_value_kind("DateTime64"), ValueKind::Date);
/// ```
#[must_use]
pub fn resolve_value_kind(data_type: &str) -> ValueKind {
    let data_type = data_type.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| data_type.contains(n));

    if contains_any(&["string", "fixedstring", "enum"]) {
        ValueKind::String
    } else if contains_any(&["int", "float", "decimal", "double", "uint"]) {
        ValueKind::Number
    } else if contains_any(&["date", "datetime"]) {
        ValueKind::Date
    } else if data_type.contains("uuid") {
        ValueKind::Uuid
    } else if data_type.contains("bool") {
        ValueKind::Boolean
    } else {
        ValueKind::Other
    }
}

/// Classifies a column from its name and raw type string.
///
/// Rules, in order: an `array` root is [`StructuralKind::Array`] with the value kind
/// of its single argument; a `map` root is [`StructuralKind::Map`] with key and value
/// kinds; a dotted name is [`StructuralKind::Grouped`]; anything else is
/// [`StructuralKind::Basic`].
///
/// # Errors
///
/// Returns a [`ClassificationError`] if the type does not parse or if an array
/// does not have exactly one element type.
pub fn classify(column_name: &str, type_string: &str) -> Result<Classification, ClassificationError> {
    let node = parse_type(type_string).ok_or_else(|| ClassificationError::Unparseable {
        column: column_name.to_string(),
        raw_type: type_string.to_string(),
    })?;

    let (structural_kind, value_kind, key_kind) = match (&node.shape, node.data_type.as_str()) {
        (TypeShape::Map { key, value }, _) => (
            StructuralKind::Map,
            resolve_value_kind(&value.data_type),
            Some(resolve_value_kind(&key.data_type)),
        ),
        (TypeShape::Args(_), "map") => {
            return Err(ClassificationError::InvalidMap {
                column: column_name.to_string(),
                raw_type: type_string.to_string(),
            });
        },
        (TypeShape::Args(args), "array") => match args.as_slice() {
            [element] => (
                StructuralKind::Array,
                resolve_value_kind(&element.data_type),
                None,
            ),
            _ => {
                return Err(ClassificationError::InvalidArray {
                    column: column_name.to_string(),
                    raw_type: type_string.to_string(),
                });
            },
        },
        (TypeShape::Args(_), data_type) => {
            let structural_kind = if column_name.contains('.') {
                StructuralKind::Grouped
            } else {
                StructuralKind::Basic
            };
            (structural_kind, resolve_value_kind(data_type), None)
        },
    };

    Ok(Classification {
        structural_kind,
        value_kind,
        key_kind,
        node,
    })
}

/// Returns `true` if inserts must supply a non-null value for this type.
///
/// Arrays are never required: an empty array is always an acceptable value.
#[must_use]
pub fn is_required(node: &TypeNode) -> bool {
    !node.is_nullable() && node.data_type != "array"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind_order() {
        assert_eq!(resolve_value_kind("string"), ValueKind::String);
        assert_eq!(resolve_value_kind("fixedstring"), ValueKind::String);
        assert_eq!(resolve_value_kind("enum16"), ValueKind::String);
        assert_eq!(resolve_value_kind("int32"), ValueKind::Number);
        assert_eq!(resolve_value_kind("decimal"), ValueKind::Number);
        assert_eq!(resolve_value_kind("date32"), ValueKind::Date);
        assert_eq!(resolve_value_kind("datetime"), ValueKind::Date);
        assert_eq!(resolve_value_kind("uuid"), ValueKind::Uuid);
        assert_eq!(resolve_value_kind("bool"), ValueKind::Boolean);
        assert_eq!(resolve_value_kind("ipv4"), ValueKind::Other);
        // substring matching: "point" contains "int"
        assert_eq!(resolve_value_kind("point"), ValueKind::Number);
    }

    #[test]
    fn test_basic_and_grouped() {
        let c = classify("title", "String").unwrap();
        assert_eq!(c.structural_kind, StructuralKind::Basic);
        assert_eq!(c.value_kind, ValueKind::String);
        assert_eq!(c.key_kind, None);

        let c = classify("campaign.id", "String").unwrap();
        assert_eq!(c.structural_kind, StructuralKind::Grouped);
        assert_eq!(c.value_kind, ValueKind::String);
    }

    #[test]
    fn test_array_takes_element_kind() {
        let c = classify("ids.label", "Array(LowCardinality(String))").unwrap();
        assert_eq!(c.structural_kind, StructuralKind::Array);
        assert_eq!(c.value_kind, ValueKind::String);

        let c = classify("scores", "Array(Float64)").unwrap();
        assert_eq!(c.value_kind, ValueKind::Number);
    }

    #[test]
    fn test_map_kinds() {
        let c = classify("dimensions", "Map(LowCardinality(String), UUID)").unwrap();
        assert_eq!(c.structural_kind, StructuralKind::Map);
        assert_eq!(c.key_kind, Some(ValueKind::String));
        assert_eq!(c.value_kind, ValueKind::Uuid);
    }

    #[test]
    fn test_invalid_definitions() {
        assert_eq!(
            classify("tags", "Array()"),
            Err(ClassificationError::InvalidArray {
                column: "tags".to_string(),
                raw_type: "Array()".to_string(),
            })
        );
        assert!(matches!(
            classify("tags", "Array(String, String)"),
            Err(ClassificationError::InvalidArray { .. })
        ));
        assert!(matches!(
            classify("props", "Map(String)"),
            Err(ClassificationError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_required() {
        assert!(is_required(&parse_type("String").unwrap()));
        assert!(is_required(&parse_type("LowCardinality(String)").unwrap()));
        assert!(is_required(&parse_type("Map(String, String)").unwrap()));
        assert!(!is_required(&parse_type("Nullable(String)").unwrap()));
        assert!(!is_required(&parse_type("LowCardinality(Nullable(String))").unwrap()));
        assert!(!is_required(&parse_type("Array(String)").unwrap()));
    }
}
