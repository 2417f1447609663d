//! Aggregate query construction for profiling.
//!
//! Every query built here comes with the list of [`Projection`]s it selects, in
//! the order the expressions appear. Results are matched to columns by position.

use chprep_core_common::TableRef;

use crate::classify::{StructuralKind, ValueKind};
use crate::config::ProfileConfig;
use crate::schema::{ColumnDescriptor, FamilyKind, SchemaEntry};

/// A statistic a projected expression computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
    /// Key universe of a map, or discriminator values of a nested family
    UniqueKeys,
    /// Number of distinct values (distinct keys for maps)
    DistinctCount,
    /// Minimum value
    MinValue,
    /// Maximum value
    MaxValue,
    /// Average value, numbers only
    AvgValue,
    /// Rows with a present value
    ValueRows,
    /// Sorted distinct values, stored under the given key
    ValueList(String),
}

/// One projected expression and the column it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Entry name the result is stored under
    pub target: String,
    /// What the expression computes
    pub metric: Metric,
    /// SQL expression
    pub expression: String,
}

impl Projection {
    fn new(target: &str, metric: Metric, expression: String) -> Self {
        Self {
            target: target.to_string(),
            metric,
            expression,
        }
    }
}

/// A single-row aggregate query with its positional projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery {
    /// Query text
    pub sql: String,
    /// One per selected expression, in order
    pub projections: Vec<Projection>,
}

impl BatchQuery {
    /// Builds a query selecting `projections` from a table.
    ///
    /// Returns `None` when there is nothing to select.
    #[must_use]
    pub fn select(table: &TableRef, filter: Option<&str>, projections: Vec<Projection>) -> Option<Self> {
        if projections.is_empty() {
            return None;
        }
        let expressions: Vec<&str> = projections.iter().map(|p| p.expression.as_str()).collect();
        let sql = format!(
            "SELECT {} FROM {}{}",
            expressions.join(", "),
            table.qualified(),
            where_clause(filter)
        );
        Some(Self { sql, projections })
    }

    /// Distinct targets of this query, in order.
    #[must_use]
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for projection in &self.projections {
            if !targets.contains(&projection.target.as_str()) {
                targets.push(&projection.target);
            }
        }
        targets
    }
}

/// Quotes an identifier with backticks.
///
/// ```
/// use chprep_core::queries::quote_identifier;
///
/// assert_eq!(quote_identifier("ids.label"), "`ids.label`");
/// assert_eq!(quote_identifier("we`ird"), "`we\\`ird`");
/// ```
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

/// Quotes a string literal with single quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn where_clause(filter: Option<&str>) -> String {
    match filter.map(str::trim) {
        Some(filter) if !filter.is_empty() => format!(" WHERE {filter}"),
        _ => String::new(),
    }
}

/// Builds the row count query.
///
/// ```
/// use chprep_core::queries::count_query;
/// use chprep_core_common::TableRef;
///
/// let table = TableRef::new("dev", "entities");
/// assert_eq!(count_query(&table, None), "SELECT count() FROM dev.`entities`");
/// assert_eq!(
///     count_query(&table, Some("type = 'Product'")),
///     "SELECT count() FROM dev.`entities` WHERE type = 'Product'"
/// );
/// ```
#[must_use]
pub fn count_query(table: &TableRef, filter: Option<&str>) -> String {
    format!("SELECT count() FROM {}{}", table.qualified(), where_clause(filter))
}

/// Aggregates to request for one profile target.
///
/// | kind | aggregates |
/// |---|---|
/// | Map | key universe, distinct key count, rows with at least one key |
/// | Array of String | non-empty rows, distinct element count |
/// | Array of other | non-empty rows |
/// | Grouped family | none |
/// | Nested family | distinct discriminator values, rows with at least one |
/// | Basic Date | min, max, non-null rows |
/// | Basic Number | min, max, avg, non-null non-zero rows |
/// | Basic String | distinct count, non-empty rows |
/// | Basic other | distinct count, non-null rows |
///
/// A number equal to zero is not counted as present: zero is treated as the
/// "not provided" default of a non-nullable numeric column, which also hides
/// genuine zeros.
#[must_use]
pub fn projections_for(entry: &SchemaEntry, config: &ProfileConfig) -> Vec<Projection> {
    match entry {
        SchemaEntry::Column(column) => column_projections(column),
        SchemaEntry::Family(family) => match family.kind {
            FamilyKind::Grouped => Vec::new(),
            FamilyKind::Nested => {
                let Some(discriminator) = config.discriminator(family) else {
                    return Vec::new();
                };
                let target = &family.parent_name;
                let member = quote_identifier(&format!("{target}.{discriminator}"));
                vec![
                    Projection::new(
                        target,
                        Metric::UniqueKeys,
                        format!("arrayDistinct(arrayFlatten(groupArray({member})))"),
                    ),
                    Projection::new(
                        target,
                        Metric::ValueRows,
                        format!("countIf(length(arrayFlatten({member})) > 0)"),
                    ),
                ]
            },
        },
    }
}

fn column_projections(column: &ColumnDescriptor) -> Vec<Projection> {
    let target = column.name.as_str();
    let c = quote_identifier(target);
    let p = |metric, expression| Projection::new(target, metric, expression);

    match column.structural_kind {
        StructuralKind::Map => vec![
            p(Metric::UniqueKeys, format!("groupUniqArrayArray(mapKeys({c}))")),
            p(
                Metric::DistinctCount,
                format!("arrayUniq(groupArrayArray(mapKeys({c})))"),
            ),
            p(Metric::ValueRows, format!("countIf(length(mapKeys({c})) > 0)")),
        ],
        StructuralKind::Array if column.value_kind == ValueKind::String => vec![
            p(Metric::ValueRows, format!("countIf(length({c}) > 0)")),
            p(Metric::DistinctCount, format!("uniqArray({c})")),
        ],
        StructuralKind::Array => vec![p(Metric::ValueRows, format!("countIf(length({c}) > 0)"))],
        StructuralKind::Grouped | StructuralKind::Nested => Vec::new(),
        StructuralKind::Basic => match column.value_kind {
            ValueKind::Date => vec![
                p(Metric::MinValue, format!("min({c})")),
                p(Metric::MaxValue, format!("max({c})")),
                p(Metric::ValueRows, format!("countIf({c} IS NOT NULL)")),
            ],
            ValueKind::Number => vec![
                p(Metric::MinValue, format!("min({c})")),
                p(Metric::MaxValue, format!("max({c})")),
                p(Metric::AvgValue, format!("avg({c})")),
                p(
                    Metric::ValueRows,
                    format!("countIf({c} IS NOT NULL AND {c} <> 0)"),
                ),
            ],
            ValueKind::String => vec![
                p(Metric::DistinctCount, format!("uniq({c})")),
                p(
                    Metric::ValueRows,
                    format!("countIf({c} IS NOT NULL AND {c} != '')"),
                ),
            ],
            ValueKind::Uuid | ValueKind::Boolean | ValueKind::Other => vec![
                p(Metric::DistinctCount, format!("uniq({c})")),
                p(Metric::ValueRows, format!("countIf({c} IS NOT NULL)")),
            ],
        },
    }
}

/// Builds one query per batch of `batch_size` profile targets.
///
/// Batches whose targets request no aggregates are omitted.
#[must_use]
pub fn batch_queries(
    table: &TableRef,
    filter: Option<&str>,
    targets: &[&SchemaEntry],
    config: &ProfileConfig,
) -> Vec<BatchQuery> {
    targets
        .chunks(config.batch_size.max(1))
        .filter_map(|batch| {
            let projections = batch
                .iter()
                .flat_map(|entry| projections_for(entry, config))
                .collect();
            BatchQuery::select(table, filter, projections)
        })
        .collect()
}

/// Sorted distinct values of a scalar column, stored under the column's own name.
#[must_use]
pub fn value_list_projection(column: &str) -> Projection {
    Projection::new(
        column,
        Metric::ValueList(column.to_string()),
        format!("arraySort(groupUniqArray({}))", quote_identifier(column)),
    )
}

/// Sorted distinct values of one key of a map column, stored under the key.
#[must_use]
pub fn map_value_list_projection(column: &str, key: &str) -> Projection {
    Projection::new(
        column,
        Metric::ValueList(key.to_string()),
        format!(
            "arraySort(groupUniqArray(trim({}[{}])))",
            quote_identifier(column),
            quote_literal(key)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::resolve;
    use chprep_core_common::DescribedColumn;

    fn metrics(projections: &[Projection]) -> Vec<Metric> {
        projections.iter().map(|p| p.metric.clone()).collect()
    }

    #[test]
    fn test_projections_by_kind() {
        let schema = resolve(&[
            DescribedColumn::new("dimensions", "Map(String, String)"),
            DescribedColumn::new("tags", "Array(String)"),
            DescribedColumn::new("scores", "Array(Float64)"),
            DescribedColumn::new("campaign.id", "String"),
            DescribedColumn::new("created", "DateTime"),
            DescribedColumn::new("amount", "Nullable(Float64)"),
            DescribedColumn::new("title", "String"),
            DescribedColumn::new("gid", "UUID"),
        ])
        .unwrap();
        let config = ProfileConfig::new();
        let get = |name: &str| projections_for(schema.entry(name).unwrap(), &config);

        assert_eq!(
            metrics(&get("dimensions")),
            vec![Metric::UniqueKeys, Metric::DistinctCount, Metric::ValueRows]
        );
        assert_eq!(
            metrics(&get("tags")),
            vec![Metric::ValueRows, Metric::DistinctCount]
        );
        assert_eq!(metrics(&get("scores")), vec![Metric::ValueRows]);
        assert!(get("campaign").is_empty());
        assert_eq!(
            metrics(&get("created")),
            vec![Metric::MinValue, Metric::MaxValue, Metric::ValueRows]
        );
        assert_eq!(
            metrics(&get("amount")),
            vec![
                Metric::MinValue,
                Metric::MaxValue,
                Metric::AvgValue,
                Metric::ValueRows
            ]
        );
        assert_eq!(
            get("amount")[3].expression,
            "countIf(`amount` IS NOT NULL AND `amount` <> 0)"
        );
        assert_eq!(
            get("title")[1].expression,
            "countIf(`title` IS NOT NULL AND `title` != '')"
        );
        assert_eq!(
            metrics(&get("gid")),
            vec![Metric::DistinctCount, Metric::ValueRows]
        );
    }

    #[test]
    fn test_nested_family_uses_discriminator() {
        let schema = resolve(&[
            DescribedColumn::new("ids.label", "Array(String)"),
            DescribedColumn::new("ids.id_type", "Array(String)"),
        ])
        .unwrap();
        let entry = schema.entry("ids").unwrap();

        let projections = projections_for(entry, &ProfileConfig::new());
        assert_eq!(
            projections[0].expression,
            "arrayDistinct(arrayFlatten(groupArray(`ids.label`)))"
        );
        assert!(projections.iter().all(|p| p.target == "ids"));

        let config = ProfileConfig::new().with_discriminator("ids", "id_type");
        let projections = projections_for(entry, &config);
        assert_eq!(
            projections[1].expression,
            "countIf(length(arrayFlatten(`ids.id_type`)) > 0)"
        );
    }

    #[test]
    fn test_batching() {
        let described: Vec<_> = (0..25)
            .map(|i| DescribedColumn::new(format!("c{i}"), "String"))
            .collect();
        let schema = resolve(&described).unwrap();
        let table = TableRef::new("dev", "entities");
        let queries = batch_queries(
            &table,
            Some("partition = 'x'"),
            &schema.profile_targets(),
            &ProfileConfig::new(),
        );

        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0].targets().len(), 10);
        assert_eq!(queries[2].targets(), vec!["c20", "c21", "c22", "c23", "c24"]);
        assert_eq!(queries[0].projections.len(), 20);
        assert!(queries[0].sql.starts_with("SELECT uniq(`c0`), countIf("));
        assert!(queries[0].sql.ends_with("FROM dev.`entities` WHERE partition = 'x'"));
    }

    #[test]
    fn test_batch_without_aggregates_is_skipped() {
        let schema = resolve(&[
            DescribedColumn::new("campaign.id", "String"),
            DescribedColumn::new("campaign.name", "String"),
        ])
        .unwrap();
        let table = TableRef::new("dev", "entities");
        let queries = batch_queries(&table, None, &schema.profile_targets(), &ProfileConfig::new());
        assert!(queries.is_empty());
    }

    #[test]
    fn test_value_list_projections() {
        let projection = map_value_list_projection("dimensions", "it's");
        assert_eq!(projection.metric, Metric::ValueList("it's".to_string()));
        assert_eq!(
            projection.expression,
            "arraySort(groupUniqArray(trim(`dimensions`['it\\'s'])))"
        );
        let projection = value_list_projection("status");
        assert_eq!(projection.metric, Metric::ValueList("status".to_string()));
        assert_eq!(projection.expression, "arraySort(groupUniqArray(`status`))");
    }
}
