//! Table identity and schema rows as reported by the store.

use std::fmt;

/// One result row, values in projection order.
pub type Row = Vec<serde_json::Value>;

/// A fully qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Database (schema) name
    pub database: String,
    /// Table name
    pub table: String,
}

impl TableRef {
    /// Creates a table reference.
    #[must_use]
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Renders the reference as used in queries: ``db.`table` ``.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.`{}`", self.database, self.table.replace('`', "\\`"))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// A column as returned by the schema-retrieval call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedColumn {
    /// Column name, possibly dotted (`items.id`)
    pub name: String,
    /// Raw type string (`Array(Nullable(String))`)
    pub raw_type: String,
    /// Default expression kind (`DEFAULT`, `MATERIALIZED`, `ALIAS`), if any
    pub default_kind: Option<String>,
}

impl DescribedColumn {
    /// Creates a described column without a default expression.
    #[must_use]
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            default_kind: None,
        }
    }

    /// Set the default expression kind.
    #[must_use]
    pub fn with_default_kind(mut self, kind: impl Into<String>) -> Self {
        let kind = kind.into();
        self.default_kind = if kind.trim().is_empty() {
            None
        } else {
            Some(kind)
        };
        self
    }

    /// Returns `true` if the store computes this column and rejects inserts into it.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.default_kind.as_deref().is_some_and(|kind| {
            kind.eq_ignore_ascii_case("alias") || kind.eq_ignore_ascii_case("materialized")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_quotes_table_name() {
        let table = TableRef::new("dev", "semantic_events");
        assert_eq!(table.qualified(), "dev.`semantic_events`");
        assert_eq!(table.to_string(), "dev.semantic_events");
    }

    #[test]
    fn computed_columns() {
        assert!(DescribedColumn::new("a", "String").with_default_kind("ALIAS").is_computed());
        assert!(
            DescribedColumn::new("a", "String")
                .with_default_kind("MATERIALIZED")
                .is_computed()
        );
        assert!(!DescribedColumn::new("a", "String").with_default_kind("DEFAULT").is_computed());
        assert_eq!(
            DescribedColumn::new("a", "String").with_default_kind("").default_kind,
            None
        );
    }
}
