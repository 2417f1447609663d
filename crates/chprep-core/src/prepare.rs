//! Record preparation: from semi-structured records to an insert-ready batch.
//!
//! The pipeline, per batch of records:
//!
//! 1. flatten nested families into parallel arrays ([`flatten_nested`])
//! 2. route fields with no target column (drop, or merge into a catch-all map)
//! 3. skip columns the store computes
//! 4. drop columns that are null or empty in every record
//! 5. coerce every remaining value ([`coerce_value`])
//!
//! Columns are emitted in schema order.

use chprep_core_common::{ColumnBatch, RowInserter, TableRef};
use log::{debug, info};
use serde_json::Value as JsonValue;

use crate::coerce::coerce_value;
use crate::config::{PrepareOptions, UnknownColumnPolicy};
use crate::error::{ConfigError, QueryError, Result};
use crate::flatten::{Record, flatten_nested};
use crate::schema::ResolvedSchema;
use crate::utils::JsonValueExt;

/// Prepares record batches for one target table.
#[derive(Debug, Clone)]
pub struct RecordPreparer<'a> {
    schema: &'a ResolvedSchema,
    options: PrepareOptions,
}

impl<'a> RecordPreparer<'a> {
    /// Creates a preparer for a resolved target schema.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the options do not fit the schema.
    pub fn new(schema: &'a ResolvedSchema, options: PrepareOptions) -> std::result::Result<Self, ConfigError> {
        options.validate(schema)?;
        Ok(Self { schema, options })
    }

    /// The target schema.
    #[must_use]
    pub fn schema(&self) -> &ResolvedSchema {
        self.schema
    }

    /// Turns records into a column batch.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::CoercionError`] if a required column receives a
    /// value that cannot be converted.
    pub fn prepare(&self, records: Vec<Record>) -> Result<ColumnBatch> {
        let mut records = flatten_nested(records, self.schema);
        for record in &mut records {
            self.route_unknown(record);
        }

        let mut batch = ColumnBatch::new(records.len());
        for column in self.schema.columns() {
            let present = records.iter().any(|r| r.contains_key(&column.name));
            if !present {
                continue;
            }
            if !column.insertable {
                debug!("Skipping computed column '{}'", column.name);
                continue;
            }
            if self.options.drop_empty_columns
                && records
                    .iter()
                    .all(|r| r.get(&column.name).is_none_or(JsonValue::is_absent))
            {
                debug!("Dropping column '{}': empty in every record", column.name);
                continue;
            }

            let values = records
                .iter_mut()
                .map(|r| coerce_value(column, r.remove(&column.name).unwrap_or(JsonValue::Null)))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            batch.push_column(column.name.clone(), values)?;
        }

        Ok(batch)
    }

    fn route_unknown(&self, record: &mut Record) {
        let unknown: Vec<String> = record
            .keys()
            .filter(|key| self.schema.column(key).is_none())
            .cloned()
            .collect();
        if unknown.is_empty() {
            return;
        }

        match &self.options.unknown_columns {
            UnknownColumnPolicy::Drop => {
                for key in &unknown {
                    record.remove(key);
                }
            },
            UnknownColumnPolicy::RedirectTo(catch_all) => {
                let mut extra = match record.remove(catch_all) {
                    Some(JsonValue::Object(entries)) => entries,
                    _ => serde_json::Map::new(),
                };
                for key in unknown {
                    let Some(value) = record.remove(&key) else {
                        continue;
                    };
                    if !value.is_null_or_empty() && !extra.contains_key(&key) {
                        extra.insert(key, value);
                    }
                }
                extra.retain(|_, value| !value.is_null_or_empty());
                record.insert(catch_all.clone(), JsonValue::Object(extra));
            },
        }
    }
}

/// Prepares records and inserts them into `table`.
///
/// # Arguments
///
/// * `inserter` - Insert collaborator
/// * `table` - Target table
/// * `preparer` - Preparer built from the target table's schema
/// * `records` - Records to insert
///
/// # Returns
///
/// The number of rows the store reports as written.
///
/// # Errors
///
/// Returns an error if preparation fails or the insert is rejected.
pub async fn insert_records<I>(
    inserter: &I,
    table: &TableRef,
    preparer: &RecordPreparer<'_>,
    records: Vec<Record>,
) -> Result<u64>
where
    I: RowInserter + ?Sized,
{
    let batch = preparer.prepare(records)?;
    if batch.is_empty() {
        info!("Nothing to insert into {table}");
        return Ok(0);
    }

    debug!(
        "Inserting {} row(s) x {} column(s) into {table}",
        batch.num_rows(),
        batch.num_columns()
    );
    let written = inserter
        .insert(table, &batch)
        .await
        .map_err(|source| QueryError::Insert {
            table: table.qualified(),
            source,
        })?;
    info!("Inserted {written} row(s) into {table}");
    Ok(written)
}
