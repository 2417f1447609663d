//! Table profiling through batched aggregate queries.
//!
//! Profiling runs in up to two passes over a resolved schema:
//!
//! 1. **Statistics**: profile targets are split into batches and each batch is
//!    answered by one single-row aggregate query (see [`crate::queries`]).
//! 2. **Low-cardinality probe** (opt-in): String-valued columns whose distinct
//!    count falls strictly between 1 and the configured bound get their actual
//!    distinct values fetched.
//!
//! A failed batch never aborts its siblings: the failure is logged and recorded
//! as an error marker on every column of that batch. Only the row count, table
//! lookup and schema retrieval are fatal.
//!
//! Statistics are returned as a [`TableStatistics`] separate from the schema;
//! [`ProfiledTable::assemble`] joins the two by entry name.

use chprep_core_common::{QueryExecutor, Row, TableRef};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use serde_json::Value as JsonValue;

use crate::classify::{StructuralKind, ValueKind};
use crate::config::ProfileRequest;
use crate::error::{QueryError, Result, SchemaError};
use crate::queries::{
    BatchQuery, Metric, Projection, batch_queries, count_query, map_value_list_projection,
    value_list_projection,
};
use crate::schema::{RejectedColumn, ResolvedSchema, SchemaEntry, resolve};
use crate::utils::JsonValueExt;

/// Statistics of one column or family.
///
/// Which fields are populated depends on the entry's structural and value kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnProfile {
    /// Minimum, dates and numbers
    pub min_value: Option<JsonValue>,
    /// Maximum, dates and numbers
    pub max_value: Option<JsonValue>,
    /// Average, numbers only
    pub avg_value: Option<f64>,
    /// Distinct count (distinct keys for maps)
    pub unique_values: Option<u64>,
    /// Map key universe, or nested family discriminator values
    pub unique_keys: Option<Vec<String>>,
    /// Distinct values per key, from the low-cardinality probe
    pub value_list: IndexMap<String, Vec<String>>,
    /// Rows with a present value
    pub value_rows: Option<u64>,
}

impl ColumnProfile {
    /// Returns `true` if at least one row has a value.
    #[must_use]
    pub fn has_values(&self) -> bool {
        self.value_rows.is_some_and(|rows| rows > 0)
    }

    fn apply(&mut self, metric: Metric, value: JsonValue) {
        match metric {
            Metric::UniqueKeys => self.unique_keys = Some(value.to_string_list()),
            Metric::DistinctCount => self.unique_values = value.as_count(),
            Metric::MinValue => self.min_value = (!value.is_null()).then_some(value),
            Metric::MaxValue => self.max_value = (!value.is_null()).then_some(value),
            Metric::AvgValue => self.avg_value = value.as_float(),
            Metric::ValueRows => self.value_rows = value.as_count(),
            Metric::ValueList(key) => {
                self.value_list.insert(key, value.to_string_list());
            },
        }
    }
}

/// Profiling results, keyed by schema entry name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStatistics {
    /// Rows matching the filter
    pub rows: u64,
    /// Profiles of entries whose queries succeeded
    pub profiles: IndexMap<String, ColumnProfile>,
    /// Error markers of entries whose queries failed
    pub errors: IndexMap<String, String>,
}

impl TableStatistics {
    /// Profile of an entry, if computed.
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&ColumnProfile> {
        self.profiles.get(name)
    }

    /// Error marker of an entry, if any query for it failed.
    #[must_use]
    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }

    fn merge(&mut self, query: &BatchQuery, result: std::result::Result<Row, QueryError>) {
        match result {
            Ok(row) => {
                for (projection, value) in query.projections.iter().zip(row) {
                    self.profiles
                        .entry(projection.target.clone())
                        .or_default()
                        .apply(projection.metric.clone(), value);
                }
            },
            Err(e) => {
                warn!("Error executing batch query: {e}");
                for target in query.targets() {
                    self.errors.insert(target.to_string(), e.to_string());
                }
            },
        }
    }
}

/// Runs profiling queries through a [`QueryExecutor`].
pub struct Profiler<'a, E: ?Sized> {
    executor: &'a E,
}

impl<'a, E: QueryExecutor + ?Sized> Profiler<'a, E> {
    /// Creates a profiler over an executor.
    #[must_use]
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// Computes statistics for every profile target of `schema`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the row count cannot be retrieved. Failures of
    /// individual batches are recorded in [`TableStatistics::errors`] instead.
    pub async fn profile(
        &self,
        schema: &ResolvedSchema,
        request: &ProfileRequest,
    ) -> Result<TableStatistics> {
        let filter = request.effective_filter();
        let filter = filter.as_deref();
        let config = &request.config;

        let rows = self.count_rows(&request.table, filter).await?;
        let mut stats = TableStatistics {
            rows,
            ..TableStatistics::default()
        };
        if rows == 0 {
            info!("Table {} has no matching rows, skipping column statistics", request.table);
            return Ok(stats);
        }

        let targets = schema.profile_targets();
        let queries = batch_queries(&request.table, filter, &targets, config);
        info!(
            "Profiling {} column(s) of {} in {} batch(es)",
            targets.len(),
            request.table,
            queries.len()
        );
        self.run_batches(queries, config.max_concurrent_batches, &mut stats)
            .await;

        if config.low_cardinality_probe {
            let queries = probe_queries(schema, &stats, request, filter);
            info!("Probing low-cardinality values in {} batch(es)", queries.len());
            self.run_batches(queries, config.max_concurrent_batches, &mut stats)
                .await;
        }

        Ok(stats)
    }

    async fn count_rows(&self, table: &TableRef, filter: Option<&str>) -> Result<u64> {
        let sql = count_query(table, filter);
        debug!("Executing count query: {sql}");

        let row = self.fetch_row(&sql, 1).await.inspect_err(|e| {
            error!("Error counting rows: {e}");
        })?;
        let count = row.first().and_then(|value| value.as_count());
        count.ok_or_else(|| {
            QueryError::UnexpectedShape {
                expected: "a row count".to_string(),
                found: row
                    .first()
                    .map_or_else(|| "nothing".to_string(), ToString::to_string),
            }
            .into()
        })
    }

    async fn run_batches(
        &self,
        queries: Vec<BatchQuery>,
        concurrency: usize,
        stats: &mut TableStatistics,
    ) {
        let outcomes: Vec<_> = stream::iter(queries)
            .map(|query| async move {
                debug!("Executing batch query: {}", query.sql);
                let result = self.fetch_row(&query.sql, query.projections.len()).await;
                (query, result)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        for (query, result) in outcomes {
            stats.merge(&query, result);
        }
    }

    /// Runs a query expected to return exactly one row of `width` values.
    async fn fetch_row(&self, sql: &str, width: usize) -> std::result::Result<Row, QueryError> {
        let mut rows = self
            .executor
            .query(sql)
            .await
            .map_err(|source| QueryError::Execution {
                query: sql.to_string(),
                source,
            })?;

        if rows.len() == 1 && rows[0].len() == width {
            return Ok(rows.swap_remove(0));
        }
        let found = match rows.as_slice() {
            [row] => format!("{} value(s)", row.len()),
            [] => "no rows".to_string(),
            _ => format!("{} rows", rows.len()),
        };
        Err(QueryError::UnexpectedShape {
            expected: format!("one row of {width} value(s)"),
            found,
        })
    }
}

/// Builds the low-cardinality probe queries.
fn probe_queries(
    schema: &ResolvedSchema,
    stats: &TableStatistics,
    request: &ProfileRequest,
    filter: Option<&str>,
) -> Vec<BatchQuery> {
    let bound = request.config.low_cardinality_bound;
    let mut per_target: Vec<Vec<Projection>> = Vec::new();

    for entry in schema.entries() {
        let SchemaEntry::Column(column) = entry else {
            continue;
        };
        if column.value_kind != ValueKind::String {
            continue;
        }
        let Some(profile) = stats.profile(&column.name) else {
            continue;
        };
        if !profile.unique_values.is_some_and(|n| (2..bound).contains(&n)) {
            continue;
        }

        match column.structural_kind {
            StructuralKind::Basic => per_target.push(vec![value_list_projection(&column.name)]),
            StructuralKind::Map => {
                let keys = profile.unique_keys.as_deref().unwrap_or_default();
                if !keys.is_empty() {
                    per_target.push(
                        keys.iter()
                            .map(|key| map_value_list_projection(&column.name, key))
                            .collect(),
                    );
                }
            },
            StructuralKind::Array | StructuralKind::Grouped | StructuralKind::Nested => {},
        }
    }

    per_target
        .chunks(request.config.batch_size.max(1))
        .filter_map(|chunk| BatchQuery::select(&request.table, filter, chunk.concat()))
        .collect()
}

/// One entry of a profiled table, joined with its statistics.
#[derive(Debug, Clone, Copy)]
pub struct ProfiledColumn<'a> {
    /// Schema entry
    pub entry: &'a SchemaEntry,
    /// Statistics, if computed
    pub profile: Option<&'a ColumnProfile>,
    /// Error marker, if a query for this entry failed
    pub error: Option<&'a str>,
}

/// A resolved schema joined with its statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfiledTable {
    /// Profiled table
    pub table: TableRef,
    /// Effective filter the statistics were computed under
    pub filter: Option<String>,
    /// Resolved schema
    pub schema: ResolvedSchema,
    /// Statistics keyed by entry name
    pub statistics: TableStatistics,
}

impl ProfiledTable {
    /// Joins a schema and its statistics.
    ///
    /// Statistics for names the schema does not have are discarded.
    #[must_use]
    pub fn assemble(
        request: &ProfileRequest,
        schema: ResolvedSchema,
        mut statistics: TableStatistics,
    ) -> Self {
        statistics.profiles.retain(|name, _| {
            let known = schema.entry(name).is_some();
            if !known {
                debug!("Discarding statistics for unknown entry '{name}'");
            }
            known
        });
        statistics.errors.retain(|name, _| schema.entry(name).is_some());

        Self {
            table: request.table.clone(),
            filter: request.effective_filter(),
            schema,
            statistics,
        }
    }

    /// Rows matching the filter.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.statistics.rows
    }

    /// Looks up an entry with its statistics.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ProfiledColumn<'_>> {
        self.schema.entry(name).map(|entry| self.join(entry))
    }

    /// Entries with their statistics, in schema order.
    pub fn columns(&self) -> impl Iterator<Item = ProfiledColumn<'_>> {
        self.schema.entries().map(|entry| self.join(entry))
    }

    /// Columns left out of profiling because they could not be resolved.
    #[must_use]
    pub fn rejected(&self) -> &[RejectedColumn] {
        self.schema.rejected()
    }

    fn join<'a>(&'a self, entry: &'a SchemaEntry) -> ProfiledColumn<'a> {
        ProfiledColumn {
            entry,
            profile: self.statistics.profile(entry.name()),
            error: self.statistics.error(entry.name()),
        }
    }
}

/// Looks up, resolves and profiles a table.
///
/// # Errors
///
/// Returns a [`SchemaError`] if the table does not exist, its schema cannot be
/// retrieved, or a family cannot be grouped; a [`QueryError`] if the row count
/// fails; a [`crate::error::ConfigError`] if the request's options are invalid.
pub async fn profile_table<E>(executor: &E, request: &ProfileRequest) -> Result<ProfiledTable>
where
    E: QueryExecutor + ?Sized,
{
    request.config.validate()?;
    let table = &request.table;

    let tables = executor
        .list_tables(&table.database)
        .await
        .map_err(|e| SchemaError::Retrieval {
            table: table.qualified(),
            message: format!("could not list tables: {e}"),
        })?;
    if !tables.iter().any(|name| *name == table.table) {
        error!("Table {} does not exist", table.qualified());
        return Err(SchemaError::TableNotFound {
            database: table.database.clone(),
            table: table.table.clone(),
        }
        .into());
    }

    let described = executor
        .describe_table(table)
        .await
        .map_err(|e| SchemaError::Retrieval {
            table: table.qualified(),
            message: e.to_string(),
        })?;
    if described.is_empty() {
        return Err(SchemaError::Retrieval {
            table: table.qualified(),
            message: "no columns returned".to_string(),
        }
        .into());
    }

    let schema = resolve(&described)?;
    let statistics = Profiler::new(executor).profile(&schema, request).await?;
    info!(
        "Profiled {} entries of {} ({} rows, {} error(s))",
        schema.len(),
        table,
        statistics.rows,
        statistics.errors.len()
    );
    Ok(ProfiledTable::assemble(request, schema, statistics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chprep_core_common::DescribedColumn;
    use serde_json::json;

    #[test]
    fn test_apply_metrics() {
        let mut profile = ColumnProfile::default();
        profile.apply(Metric::MinValue, json!(1));
        profile.apply(Metric::MaxValue, JsonValue::Null);
        profile.apply(Metric::AvgValue, json!("2.5"));
        profile.apply(Metric::ValueRows, json!("0"));
        profile.apply(Metric::UniqueKeys, json!(["a", "b"]));
        profile.apply(Metric::ValueList("a".to_string()), json!(["x", "y"]));

        assert_eq!(profile.min_value, Some(json!(1)));
        assert_eq!(profile.max_value, None);
        assert_eq!(profile.avg_value, Some(2.5));
        assert_eq!(profile.value_rows, Some(0));
        assert!(!profile.has_values());
        assert_eq!(profile.unique_keys, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(profile.value_list["a"], vec!["x", "y"]);
    }

    #[test]
    fn test_merge_error_marks_every_target() {
        let schema = resolve(&[
            DescribedColumn::new("a", "String"),
            DescribedColumn::new("b", "Int32"),
        ])
        .unwrap();
        let table = TableRef::new("dev", "t");
        let request = ProfileRequest::new("dev", "t");
        let queries = batch_queries(&table, None, &schema.profile_targets(), &request.config);

        let mut stats = TableStatistics::default();
        stats.merge(
            &queries[0],
            Err(QueryError::UnexpectedShape {
                expected: "x".to_string(),
                found: "y".to_string(),
            }),
        );
        assert!(stats.profiles.is_empty());
        assert_eq!(stats.errors.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_probe_selection() {
        let schema = resolve(&[
            DescribedColumn::new("status", "String"),
            DescribedColumn::new("title", "String"),
            DescribedColumn::new("constant", "String"),
            DescribedColumn::new("dimensions", "Map(String, String)"),
            DescribedColumn::new("amount", "Int32"),
        ])
        .unwrap();
        let mut stats = TableStatistics {
            rows: 10,
            ..TableStatistics::default()
        };
        let with_unique = |n| ColumnProfile {
            unique_values: Some(n),
            ..ColumnProfile::default()
        };
        stats.profiles.insert("status".to_string(), with_unique(3));
        stats.profiles.insert("title".to_string(), with_unique(500));
        stats.profiles.insert("constant".to_string(), with_unique(1));
        stats.profiles.insert(
            "dimensions".to_string(),
            ColumnProfile {
                unique_values: Some(2),
                unique_keys: Some(vec!["color".to_string(), "size".to_string()]),
                ..ColumnProfile::default()
            },
        );
        stats.profiles.insert("amount".to_string(), with_unique(5));

        let request = ProfileRequest::new("dev", "t");
        let queries = probe_queries(&schema, &stats, &request, None);
        assert_eq!(queries.len(), 1);
        let metrics: Vec<_> = queries[0]
            .projections
            .iter()
            .map(|p| (p.target.as_str(), p.metric.clone()))
            .collect();
        assert_eq!(
            metrics,
            vec![
                ("status", Metric::ValueList("status".to_string())),
                ("dimensions", Metric::ValueList("color".to_string())),
                ("dimensions", Metric::ValueList("size".to_string())),
            ]
        );
    }

    #[test]
    fn test_assemble_joins_by_name() {
        let schema = resolve(&[
            DescribedColumn::new("a", "String"),
            DescribedColumn::new("b", "String"),
        ])
        .unwrap();
        let mut stats = TableStatistics {
            rows: 4,
            ..TableStatistics::default()
        };
        stats.profiles.insert("a".to_string(), ColumnProfile::default());
        stats.profiles.insert("ghost".to_string(), ColumnProfile::default());
        stats.errors.insert("b".to_string(), "boom".to_string());

        let request = ProfileRequest::new("dev", "t").with_filter("x = 1");
        let table = ProfiledTable::assemble(&request, schema, stats);

        assert_eq!(table.rows(), 4);
        assert_eq!(table.filter.as_deref(), Some("x = 1"));
        assert!(table.statistics.profile("ghost").is_none());
        assert!(table.get("a").unwrap().profile.is_some());
        assert_eq!(table.get("b").unwrap().error, Some("boom"));
        assert_eq!(table.columns().count(), 2);
    }
}
