//! Text rendering of profiling results.

use tabled::{Table, Tabled};

use crate::profiler::{ProfiledColumn, ProfiledTable};
use crate::schema::{RejectedColumn, SchemaEntry};
use crate::utils::JsonValueExt;

const MAX_KEYS_WIDTH: usize = 60;

/// Table row representation for one profiled entry.
#[derive(Tabled)]
pub struct ProfileRow {
    /// Column or family name.
    #[tabled(rename = "Column")]
    pub name: String,
    /// Structural kind.
    #[tabled(rename = "Kind")]
    pub kind: String,
    /// Value kind, `Various` for families.
    #[tabled(rename = "Value Kind")]
    pub value_kind: String,
    /// Key kind, maps only.
    #[tabled(rename = "Key Kind")]
    pub key_kind: String,
    /// Rows with a present value.
    #[tabled(rename = "Value Rows")]
    pub value_rows: String,
    /// Distinct values.
    #[tabled(rename = "Unique Values")]
    pub unique_values: String,
    /// Minimum value.
    #[tabled(rename = "Min")]
    pub min_value: String,
    /// Maximum value.
    #[tabled(rename = "Max")]
    pub max_value: String,
    /// Key universe, or the error marker of a failed entry.
    #[tabled(rename = "Unique Keys")]
    pub unique_keys: String,
}

impl From<ProfiledColumn<'_>> for ProfileRow {
    fn from(column: ProfiledColumn<'_>) -> Self {
        let profile = column.profile;
        let (value_kind, key_kind) = match column.entry {
            SchemaEntry::Column(c) => (
                c.value_kind.to_string(),
                c.key_kind.map(|k| k.to_string()).unwrap_or_default(),
            ),
            SchemaEntry::Family(_) => ("Various".to_string(), String::new()),
        };

        let unique_values = match column.entry {
            SchemaEntry::Family(_) => profile
                .and_then(|p| p.unique_keys.as_ref())
                .map(Vec::len)
                .map(|n| n as u64),
            SchemaEntry::Column(_) => profile.and_then(|p| p.unique_values),
        };

        let unique_keys = match (column.error, profile.and_then(|p| p.unique_keys.as_ref())) {
            (Some(error), _) => format!("error: {error}"),
            (None, Some(keys)) => truncate(&keys.join(", "), MAX_KEYS_WIDTH),
            (None, None) => String::new(),
        };

        Self {
            name: column.entry.name().to_string(),
            kind: column.entry.structural_kind().to_string(),
            value_kind,
            key_kind,
            value_rows: profile
                .and_then(|p| p.value_rows)
                .map_or_else(|| "0".to_string(), |n| n.to_string()),
            unique_values: unique_values.map_or_else(|| "0".to_string(), |n| n.to_string()),
            min_value: profile
                .and_then(|p| p.min_value.as_ref())
                .map(JsonValueExt::to_display_string)
                .unwrap_or_default(),
            max_value: profile
                .and_then(|p| p.max_value.as_ref())
                .map(JsonValueExt::to_display_string)
                .unwrap_or_default(),
            unique_keys,
        }
    }
}

impl From<&RejectedColumn> for ProfileRow {
    fn from(column: &RejectedColumn) -> Self {
        Self {
            name: column.name.clone(),
            kind: "Rejected".to_string(),
            value_kind: truncate(&column.raw_type, MAX_KEYS_WIDTH),
            key_kind: String::new(),
            value_rows: String::new(),
            unique_values: String::new(),
            min_value: String::new(),
            max_value: String::new(),
            unique_keys: format!("error: {}", column.reason),
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Renders profiling results as a header line followed by a table.
///
/// Columns rejected during schema resolution follow the profiled entries, with
/// their type string and an `error:` marker.
///
/// # Arguments
///
/// * `profiled` - The profiled table to render
///
/// # Returns
///
/// The rendered text, without a trailing newline.
#[must_use]
pub fn render_profile(profiled: &ProfiledTable) -> String {
    let header = format!(
        "Profiling results for {} (Row Count: {})",
        profiled.table,
        profiled.rows()
    );
    let rows: Vec<ProfileRow> = profiled
        .columns()
        .map(ProfileRow::from)
        .chain(profiled.rejected().iter().map(ProfileRow::from))
        .collect();
    format!("{header}\n{}", Table::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileRequest;
    use crate::profiler::{ColumnProfile, TableStatistics};
    use crate::schema::resolve;
    use chprep_core_common::DescribedColumn;
    use serde_json::json;

    #[test]
    fn test_render_profile() {
        let schema = resolve(&[
            DescribedColumn::new("amount", "Int64"),
            DescribedColumn::new("dimensions", "Map(String, String)"),
            DescribedColumn::new("ids.label", "Array(String)"),
        ])
        .unwrap();
        let mut stats = TableStatistics {
            rows: 3,
            ..TableStatistics::default()
        };
        stats.profiles.insert(
            "amount".to_string(),
            ColumnProfile {
                min_value: Some(json!(1)),
                max_value: Some(json!(9)),
                value_rows: Some(3),
                ..ColumnProfile::default()
            },
        );
        stats.profiles.insert(
            "ids".to_string(),
            ColumnProfile {
                unique_keys: Some(vec!["email".to_string(), "phone".to_string()]),
                value_rows: Some(2),
                ..ColumnProfile::default()
            },
        );
        stats
            .errors
            .insert("dimensions".to_string(), "timeout".to_string());

        let profiled =
            ProfiledTable::assemble(&ProfileRequest::new("dev", "entities"), schema, stats);
        let text = render_profile(&profiled);

        assert!(text.starts_with("Profiling results for dev.entities (Row Count: 3)\n"));
        assert!(text.contains("Unique Keys"));
        assert!(text.contains("error: timeout"));
        assert!(text.contains("email, phone"));
        assert!(text.contains("Various"));
    }

    #[test]
    fn test_rejected_columns_are_listed() {
        let schema = resolve(&[
            DescribedColumn::new("amount", "Int64"),
            DescribedColumn::new("broken", "Array(String, Int32)"),
        ])
        .unwrap();
        assert_eq!(schema.rejected().len(), 1);

        let profiled = ProfiledTable::assemble(
            &ProfileRequest::new("dev", "entities"),
            schema,
            TableStatistics::default(),
        );
        let text = render_profile(&profiled);

        let line = text
            .lines()
            .find(|line| line.contains("broken"))
            .expect("rejected column is rendered");
        assert!(line.contains("Rejected"));
        assert!(line.contains("Array(String, Int32)"));
        assert!(line.contains("error: "));
        assert!(text.find("amount") < text.find("broken"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdefgh", 6), "abc...");
    }
}
