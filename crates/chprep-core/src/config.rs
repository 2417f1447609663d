//! Profiling and record preparation options.

use std::collections::HashMap;

use chprep_core_common::TableRef;
use log::warn;
use serde::Deserialize;

use crate::classify::StructuralKind;
use crate::error::ConfigError;
use crate::schema::{ColumnFamily, ResolvedSchema};

/// Per-family profiling options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FamilyConfig {
    /// Child name of the member whose values represent the family's "type" or "key"
    pub type_column: String,
}

/// Profiler configuration.
///
/// Loadable from JSON; missing fields take their defaults:
///
/// ```
/// use chprep_core::config::ProfileConfig;
///
/// let config = ProfileConfig::from_json(
///     r#"{"low_cardinality_probe": true, "families": {"ids": {"type_column": "id_type"}}}"#,
/// )
/// .unwrap();
/// assert_eq!(config.batch_size, 10);
/// assert_eq!(config.families["ids"].type_column, "id_type");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Number of profile targets per aggregate query (default: 10)
    pub batch_size: usize,
    /// Whether to run the low-cardinality probe (default: false)
    pub low_cardinality_probe: bool,
    /// Exclusive upper bound on `unique_values` for probed columns (default: 200)
    pub low_cardinality_bound: u64,
    /// Number of batch queries in flight at once (default: 1)
    pub max_concurrent_batches: usize,
    /// Per-family options, keyed by family name
    pub families: HashMap<String, FamilyConfig>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            low_cardinality_probe: false,
            low_cardinality_bound: 200,
            max_concurrent_batches: 1,
            families: HashMap::new(),
        }
    }
}

impl ProfileConfig {
    /// Create a new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable the low-cardinality probe
    #[must_use]
    pub fn with_low_cardinality_probe(mut self, enabled: bool) -> Self {
        self.low_cardinality_probe = enabled;
        self
    }

    /// Set the low-cardinality bound
    #[must_use]
    pub fn with_low_cardinality_bound(mut self, bound: u64) -> Self {
        self.low_cardinality_bound = bound;
        self
    }

    /// Set the number of concurrent batch queries
    #[must_use]
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max;
        self
    }

    /// Set the discriminator column of a nested family
    #[must_use]
    pub fn with_discriminator(
        mut self,
        family: impl Into<String>,
        type_column: impl Into<String>,
    ) -> Self {
        self.families.insert(
            family.into(),
            FamilyConfig {
                type_column: type_column.into(),
            },
        );
        self
    }

    /// Parses a config from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if the JSON is malformed or a value
    /// is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidOption {
                option: "profile config".to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks option ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for a zero batch size, zero
    /// concurrency, or a bound that no column could satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.max_concurrent_batches == 0 {
            return Err(invalid("max_concurrent_batches", "must be at least 1"));
        }
        if self.low_cardinality_bound < 3 {
            return Err(invalid(
                "low_cardinality_bound",
                "must be at least 3 for any column to qualify",
            ));
        }
        Ok(())
    }

    /// Child name of the discriminator column of a nested family.
    ///
    /// Defaults to the first member. A configured column the family does not have
    /// falls back to the first member with a warning.
    #[must_use]
    pub fn discriminator<'a>(&'a self, family: &'a ColumnFamily) -> Option<&'a str> {
        let first = family.members.first().map(|m| m.child_name())?;
        match self.families.get(&family.parent_name) {
            Some(config) if family.member(&config.type_column).is_some() => {
                Some(config.type_column.as_str())
            },
            Some(config) => {
                warn!(
                    "Family '{}' has no member '{}', using '{first}' as discriminator",
                    family.parent_name, config.type_column
                );
                Some(first)
            },
            None => Some(first),
        }
    }
}

/// What to profile: a table, an optional filter, and options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRequest {
    /// Target table
    pub table: TableRef,
    /// Row filter, without the `WHERE` keyword
    pub filter: Option<String>,
    /// Partitions to restrict to; empty means all
    pub partitions: Vec<String>,
    /// Profiler options
    pub config: ProfileConfig,
}

impl ProfileRequest {
    /// Create a request for a whole table with default options
    #[must_use]
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            table: TableRef::new(database, table),
            filter: None,
            partitions: Vec::new(),
            config: ProfileConfig::default(),
        }
    }

    /// Set the row filter
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter = if filter.trim().is_empty() {
            None
        } else {
            Some(filter)
        };
        self
    }

    /// Restrict to the given partitions
    #[must_use]
    pub fn with_partitions<I, S>(mut self, partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partitions = partitions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the profiler options
    #[must_use]
    pub fn with_config(mut self, config: ProfileConfig) -> Self {
        self.config = config;
        self
    }

    /// The effective filter: the partition restriction ANDed with the row filter.
    ///
    /// ```
    /// use chprep_core::config::ProfileRequest;
    ///
    /// let request = ProfileRequest::new("cst", "entities")
    ///     .with_partitions(["lyfja.is"])
    ///     .with_filter("type = 'Product'");
    /// assert_eq!(
    ///     request.effective_filter().as_deref(),
    ///     Some("partition IN ['lyfja.is'] AND (type = 'Product')")
    /// );
    /// ```
    #[must_use]
    pub fn effective_filter(&self) -> Option<String> {
        let partitions = (!self.partitions.is_empty()).then(|| {
            let quoted: Vec<String> = self
                .partitions
                .iter()
                .map(|p| format!("'{}'", p.replace('\\', "\\\\").replace('\'', "\\'")))
                .collect();
            format!("partition IN [{}]", quoted.join(", "))
        });
        match (partitions, &self.filter) {
            (Some(partitions), Some(filter)) => Some(format!("{partitions} AND ({filter})")),
            (Some(partitions), None) => Some(partitions),
            (None, Some(filter)) => Some(filter.clone()),
            (None, None) => None,
        }
    }
}

/// Handling of input fields that have no column in the target table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownColumnPolicy {
    /// Discard them
    #[default]
    Drop,
    /// Collect them into the named map column
    RedirectTo(String),
}

/// Record preparation options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PrepareOptions {
    /// Handling of unknown input fields (default: drop)
    pub unknown_columns: UnknownColumnPolicy,
    /// Whether to drop columns that are null or empty in every record (default: true)
    pub drop_empty_columns: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            unknown_columns: UnknownColumnPolicy::Drop,
            drop_empty_columns: true,
        }
    }
}

impl PrepareOptions {
    /// Create new options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect unknown fields into a catch-all map column
    #[must_use]
    pub fn with_catch_all(mut self, column: impl Into<String>) -> Self {
        self.unknown_columns = UnknownColumnPolicy::RedirectTo(column.into());
        self
    }

    /// Set whether all-empty columns are dropped
    #[must_use]
    pub fn with_drop_empty_columns(mut self, drop: bool) -> Self {
        self.drop_empty_columns = drop;
        self
    }

    /// Checks the options against the target schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownColumn`] if the catch-all column does not exist,
    /// or [`ConfigError::InvalidOption`] if it is not an insertable map column.
    pub fn validate(&self, schema: &ResolvedSchema) -> Result<(), ConfigError> {
        let UnknownColumnPolicy::RedirectTo(column) = &self.unknown_columns else {
            return Ok(());
        };
        let descriptor = schema.column(column).ok_or_else(|| ConfigError::UnknownColumn {
            option: "unknown_columns".to_string(),
            column: column.clone(),
        })?;
        if descriptor.structural_kind != StructuralKind::Map || !descriptor.insertable {
            return Err(invalid(
                "unknown_columns",
                &format!("catch-all column '{column}' must be an insertable Map column"),
            ));
        }
        Ok(())
    }
}

fn invalid(option: &str, message: &str) -> ConfigError {
    ConfigError::InvalidOption {
        option: option.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::resolve;
    use chprep_core_common::DescribedColumn;

    #[test]
    fn test_defaults() {
        let config = ProfileConfig::new();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.low_cardinality_bound, 200);
        assert_eq!(config.max_concurrent_batches, 1);
        assert!(!config.low_cardinality_probe);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        let err = ProfileConfig::from_json(r#"{"batch_size": 0}"#).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidOption {
                option: "batch_size".to_string(),
                message: "must be at least 1".to_string(),
            }
        );
        assert!(ProfileConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_discriminator_fallback() {
        let schema = resolve(&[
            DescribedColumn::new("ids.label", "Array(String)"),
            DescribedColumn::new("ids.id_type", "Array(String)"),
        ])
        .unwrap();
        let family = schema.nested_families().next().unwrap();

        assert_eq!(ProfileConfig::new().discriminator(family), Some("label"));

        let config = ProfileConfig::new().with_discriminator("ids", "id_type");
        assert_eq!(config.discriminator(family), Some("id_type"));

        let config = ProfileConfig::new().with_discriminator("ids", "missing");
        assert_eq!(config.discriminator(family), Some("label"));
    }

    #[test]
    fn test_effective_filter() {
        let request = ProfileRequest::new("dev", "entities");
        assert_eq!(request.effective_filter(), None);

        let request = request.with_filter("  ");
        assert_eq!(request.effective_filter(), None);

        let request = ProfileRequest::new("dev", "entities").with_partitions(["a", "it's"]);
        assert_eq!(
            request.effective_filter().as_deref(),
            Some("partition IN ['a', 'it\\'s']")
        );
    }

    #[test]
    fn test_prepare_options_validation() {
        let schema = resolve(&[
            DescribedColumn::new("dimensions", "Map(String, String)"),
            DescribedColumn::new("title", "String"),
        ])
        .unwrap();

        assert!(PrepareOptions::new().validate(&schema).is_ok());
        assert!(
            PrepareOptions::new()
                .with_catch_all("dimensions")
                .validate(&schema)
                .is_ok()
        );
        assert!(matches!(
            PrepareOptions::new().with_catch_all("extra").validate(&schema),
            Err(ConfigError::UnknownColumn { .. })
        ));
        assert!(matches!(
            PrepareOptions::new().with_catch_all("title").validate(&schema),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_prepare_options_from_json() {
        let options: PrepareOptions =
            serde_json::from_str(r#"{"unknown_columns": {"redirect_to": "properties"}}"#)
                .unwrap();
        assert_eq!(
            options.unknown_columns,
            UnknownColumnPolicy::RedirectTo("properties".to_string())
        );
        assert!(options.drop_empty_columns);
    }
}
