//! Recursive-descent parser for column type strings.
//!
//! Type strings follow the store's grammar: lower-case tokens, nesting via
//! `name(arg1, arg2, ...)`, `nullable(...)` and `lowcardinality(...)` as peelable
//! annotations, `array(t)` for arrays and `map(k, v)` for maps.
//!
//! # Examples
//!
//! ```
//! use chprep_core::type_grammar::parse_type;
//!
//! let node = parse_type("Nullable(LowCardinality(String))").expect("valid type");
//! assert_eq!(node.annotations, vec!["nullable", "lowcardinality"]);
//! assert_eq!(node.data_type, "string");
//!
//! assert!(parse_type("Map(String)").is_none());
//! ```

use std::fmt;

use thiserror::Error;

/// Annotation wrappers peeled before the core type is parsed.
pub const TYPE_ANNOTATIONS: &[&str] = &["nullable", "lowcardinality"];

/// Parsed type tree of one type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    /// Lower-cased root type name (`string`, `array`, `map`, ...)
    pub data_type: String,
    /// Annotation wrappers, outermost first
    pub annotations: Vec<String>,
    /// Type parameters
    pub shape: TypeShape,
}

/// Type parameters of a [`TypeNode`].
///
/// A node is either a map node with a key and a value, or a plain node with an
/// ordered (possibly empty) argument list. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    /// Ordinary type arguments; empty for scalar types
    Args(Vec<TypeNode>),
    /// Key and value types of a `map`
    Map {
        /// Key type
        key: Box<TypeNode>,
        /// Value type
        value: Box<TypeNode>,
    },
}

/// Why a type string failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    /// Nothing to parse
    #[error("empty type string")]
    Empty,

    /// Parentheses do not balance
    #[error("unbalanced parentheses in '{fragment}'")]
    Unbalanced {
        /// The offending fragment
        fragment: String,
    },

    /// Text follows the closing parenthesis
    #[error("unexpected input after ')' in '{fragment}'")]
    TrailingInput {
        /// The offending fragment
        fragment: String,
    },

    /// A parameter list opens without a type name
    #[error("missing type name before '(' in '{fragment}'")]
    MissingName {
        /// The offending fragment
        fragment: String,
    },

    /// Two commas in a row, or a trailing comma
    #[error("empty type argument at position {index}")]
    EmptyArgument {
        /// Zero-based argument index
        index: usize,
    },

    /// A map without exactly two arguments
    #[error("map requires exactly two type arguments, found {found}")]
    MapArity {
        /// Number of arguments found
        found: usize,
    },

    /// `nullable` or `lowcardinality` wrapping more than one type
    #[error("{annotation} wraps exactly one type, found {found}")]
    AnnotationArity {
        /// The annotation name
        annotation: String,
        /// Number of arguments found
        found: usize,
    },
}

impl TypeNode {
    /// Returns `true` if the outermost wrappers include `nullable`.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.annotations.iter().any(|a| a == "nullable")
    }

    /// Returns `true` if the outermost wrappers include `lowcardinality`.
    #[must_use]
    pub fn is_low_cardinality(&self) -> bool {
        self.annotations.iter().any(|a| a == "lowcardinality")
    }

    /// Returns `true` for map nodes.
    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self.shape, TypeShape::Map { .. })
    }

    /// Type arguments; empty for scalars and for map nodes.
    #[must_use]
    pub fn args(&self) -> &[TypeNode] {
        match &self.shape {
            TypeShape::Args(args) => args,
            TypeShape::Map { .. } => &[],
        }
    }

    /// Map key type.
    #[must_use]
    pub fn key(&self) -> Option<&TypeNode> {
        match &self.shape {
            TypeShape::Map { key, .. } => Some(key),
            TypeShape::Args(_) => None,
        }
    }

    /// Map value type.
    #[must_use]
    pub fn value(&self) -> Option<&TypeNode> {
        match &self.shape {
            TypeShape::Map { value, .. } => Some(value),
            TypeShape::Args(_) => None,
        }
    }
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for annotation in &self.annotations {
            write!(f, "{annotation}(")?;
        }
        write!(f, "{}", self.data_type)?;
        match &self.shape {
            TypeShape::Map { key, value } => write!(f, "({key}, {value})")?,
            TypeShape::Args(args) if !args.is_empty() => {
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")?;
            },
            TypeShape::Args(_) => {},
        }
        for _ in &self.annotations {
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Parses a type string, returning `None` on any malformed input.
///
/// Never returns a partially populated tree.
#[must_use]
pub fn parse_type(type_string: &str) -> Option<TypeNode> {
    parse_type_detailed(type_string).ok()
}

/// Parses a type string, reporting why it failed.
///
/// # Errors
///
/// Returns a [`TypeParseError`] for unbalanced parentheses, trailing input, empty
/// arguments, an annotation wrapping several types, or a map without exactly two
/// arguments, at any nesting depth.
pub fn parse_type_detailed(type_string: &str) -> Result<TypeNode, TypeParseError> {
    let lowered = type_string.trim().to_lowercase();
    parse_lowered(&lowered)
}

fn parse_lowered(input: &str) -> Result<TypeNode, TypeParseError> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(TypeParseError::Empty);
    }

    let mut annotations = Vec::new();
    while let Some((name, inner)) = split_call(rest)? {
        if !TYPE_ANNOTATIONS.contains(&name) {
            break;
        }
        rest = match split_args(inner)?.as_slice() {
            [] => return Err(TypeParseError::Empty),
            [wrapped] => *wrapped,
            wrapped => {
                return Err(TypeParseError::AnnotationArity {
                    annotation: name.to_string(),
                    found: wrapped.len(),
                });
            },
        };
        annotations.push(name.to_string());
    }

    let Some((name, inner)) = split_call(rest)? else {
        return Ok(TypeNode {
            data_type: rest.to_string(),
            annotations,
            shape: TypeShape::Args(Vec::new()),
        });
    };

    let mut args = split_args(inner)?
        .into_iter()
        .map(parse_lowered)
        .collect::<Result<Vec<_>, _>>()?;

    let shape = if name == "map" {
        if args.len() != 2 {
            return Err(TypeParseError::MapArity { found: args.len() });
        }
        let value = args.pop().map(Box::new);
        let key = args.pop().map(Box::new);
        match (key, value) {
            (Some(key), Some(value)) => TypeShape::Map { key, value },
            _ => return Err(TypeParseError::MapArity { found: 0 }),
        }
    } else {
        TypeShape::Args(args)
    };

    Ok(TypeNode {
        data_type: name.to_string(),
        annotations,
        shape,
    })
}

/// Splits `name(inner)` into its parts.
///
/// Returns `Ok(None)` for a string without parameters. The closing parenthesis
/// matching the first opening one must be the last character.
fn split_call(s: &str) -> Result<Option<(&str, &str)>, TypeParseError> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut open = None;
    let mut in_quote = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_quote {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'\'' => in_quote = false,
                _ => {},
            }
            continue;
        }
        match b {
            b'\'' => in_quote = true,
            b'(' => {
                if open.is_none() {
                    open = Some(i);
                }
                depth += 1;
            },
            b')' => {
                if depth == 0 {
                    return Err(unbalanced(s));
                }
                depth -= 1;
                if depth == 0 {
                    let Some(start) = open else {
                        return Err(unbalanced(s));
                    };
                    if i + 1 != bytes.len() {
                        return Err(TypeParseError::TrailingInput {
                            fragment: s.to_string(),
                        });
                    }
                    let name = s[..start].trim();
                    if name.is_empty() {
                        return Err(TypeParseError::MissingName {
                            fragment: s.to_string(),
                        });
                    }
                    return Ok(Some((name, &s[start + 1..i])));
                }
            },
            _ => {},
        }
    }

    if open.is_some() || in_quote {
        Err(unbalanced(s))
    } else {
        Ok(None)
    }
}

/// Splits a parameter list on top-level commas.
fn split_args(inner: &str) -> Result<Vec<&str>, TypeParseError> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut in_quote = false;
    let mut escaped = false;

    for (i, &b) in inner.as_bytes().iter().enumerate() {
        if in_quote {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'\'' => in_quote = false,
                _ => {},
            }
            continue;
        }
        match b {
            b'\'' => in_quote = true,
            b'(' => depth += 1,
            b')' => depth = depth.checked_sub(1).ok_or_else(|| unbalanced(inner))?,
            b',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            },
            _ => {},
        }
    }
    if depth != 0 || in_quote {
        return Err(unbalanced(inner));
    }
    parts.push(&inner[start..]);

    parts
        .into_iter()
        .enumerate()
        .map(|(index, part)| {
            let part = part.trim();
            if part.is_empty() {
                Err(TypeParseError::EmptyArgument { index })
            } else {
                Ok(part)
            }
        })
        .collect()
}

fn unbalanced(fragment: &str) -> TypeParseError {
    TypeParseError::Unbalanced {
        fragment: fragment.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let node = parse_type("  String ").unwrap();
        assert_eq!(node.data_type, "string");
        assert!(node.annotations.is_empty());
        assert!(node.args().is_empty());
        assert!(node.key().is_none());
    }

    #[test]
    fn test_annotations_peeled_outer_to_inner() {
        let node = parse_type("Nullable(LowCardinality(String))").unwrap();
        assert_eq!(node.annotations, vec!["nullable", "lowcardinality"]);
        assert_eq!(node.data_type, "string");
        assert!(node.is_nullable());
        assert!(node.is_low_cardinality());
    }

    #[test]
    fn test_annotation_inside_array_stays_on_argument() {
        let node = parse_type("Array(Nullable(UUID))").unwrap();
        assert_eq!(node.data_type, "array");
        assert!(node.annotations.is_empty());
        let arg = &node.args()[0];
        assert_eq!(arg.data_type, "uuid");
        assert_eq!(arg.annotations, vec!["nullable"]);
    }

    #[test]
    fn test_map_requires_two_arguments() {
        assert!(parse_type("Map(String)").is_none());
        assert_eq!(
            parse_type_detailed("Map(String)"),
            Err(TypeParseError::MapArity { found: 1 })
        );
        assert!(parse_type("Map(String, String, String)").is_none());

        let node = parse_type("Map(String, Array(Float64))").unwrap();
        assert!(node.is_map());
        assert!(node.args().is_empty());
        assert_eq!(node.key().unwrap().data_type, "string");
        let value = node.value().unwrap();
        assert_eq!(value.data_type, "array");
        assert_eq!(value.args().len(), 1);
        assert_eq!(value.args()[0].data_type, "float64");
    }

    #[test]
    fn test_comma_split_respects_nesting() {
        let node = parse_type("Map(String, Tuple(Int32, Int32))").unwrap();
        let value = node.value().unwrap();
        assert_eq!(value.data_type, "tuple");
        assert_eq!(value.args().len(), 2);
        assert_eq!(value.to_string(), "tuple(int32, int32)");
    }

    #[test]
    fn test_quoted_literals_are_opaque() {
        let node = parse_type("Enum8('a,b' = 1, 'c)' = 2)").unwrap();
        assert_eq!(node.data_type, "enum8");
        assert_eq!(node.args().len(), 2);
        assert_eq!(node.args()[0].data_type, "'a,b' = 1");

        let node = parse_type("DateTime64(3, 'UTC')").unwrap();
        assert_eq!(node.args()[1].data_type, "'utc'");
    }

    #[test]
    fn test_malformed_strings_fail() {
        for input in [
            "",
            "Array(String",
            "Array(String))",
            "String)",
            "Array(String) x",
            "Tuple(String,)",
            "(String)",
            "Nullable()",
            "Map(String, Map(String))",
        ] {
            assert!(parse_type(input).is_none(), "expected failure for {input:?}");
        }
    }

    #[test]
    fn test_annotation_wraps_one_type() {
        assert!(parse_type("Nullable(String, Int32)").is_none());
        assert_eq!(
            parse_type_detailed("Nullable(String, Int32)"),
            Err(TypeParseError::AnnotationArity {
                annotation: "nullable".to_string(),
                found: 2,
            })
        );
        assert_eq!(
            parse_type_detailed("Array(LowCardinality(String, String))"),
            Err(TypeParseError::AnnotationArity {
                annotation: "lowcardinality".to_string(),
                found: 2,
            })
        );
        assert_eq!(parse_type_detailed("Nullable( )"), Err(TypeParseError::Empty));
    }

    #[test]
    fn test_empty_parameter_list() {
        let node = parse_type("Tuple()").unwrap();
        assert_eq!(node.data_type, "tuple");
        assert!(node.args().is_empty());
    }

    #[test]
    fn test_display_round_trips_canonical_form() {
        let input = "nullable(map(lowcardinality(string), array(nullable(float64))))";
        assert_eq!(parse_type(input).unwrap().to_string(), input);
    }
}
