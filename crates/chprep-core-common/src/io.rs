//! I/O traits for talking to the analytical store.
//!
//! This module defines the collaborator traits the core relies on. The transport
//! (HTTP, native protocol, an in-memory fake in tests) lives behind them, so every
//! error it raises is opaque to the core and surfaces as an [`anyhow::Error`].

use anyhow::Result;
use async_trait::async_trait;

use crate::table::{DescribedColumn, Row, TableRef};
use crate::values::ColumnBatch;

/// Trait for executing read queries against the store.
///
/// Implementations forward SQL in the store's dialect and return result rows
/// positionally: the `n`-th value of a row belongs to the `n`-th projected
/// expression of the query.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes a query and returns all result rows.
    ///
    /// # Arguments
    ///
    /// * `sql` - The complete query text, including any `WHERE` clause
    ///
    /// # Returns
    ///
    /// The result rows, each an ordered list of values
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Lists the table names of a database (`SHOW TABLES IN db`).
    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;

    /// Returns the ordered column list of a table (`DESCRIBE TABLE db.table`).
    async fn describe_table(&self, table: &TableRef) -> Result<Vec<DescribedColumn>>;
}

/// Trait for writing column-oriented batches into a table.
#[async_trait]
pub trait RowInserter: Send + Sync {
    /// Inserts a batch and returns the number of rows written.
    ///
    /// # Arguments
    ///
    /// * `table` - The fully qualified target table
    /// * `batch` - Columns of equal length, one value per row
    async fn insert(&self, table: &TableRef, batch: &ColumnBatch) -> Result<u64>;
}
