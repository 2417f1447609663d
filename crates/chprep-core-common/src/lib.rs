//! Common types and traits shared across `chprep` crates.
//!
//! This crate provides the boundary abstractions between `chprep-core` and the
//! collaborators it talks to (query transport, bulk inserter), preventing the core
//! from depending on any particular database client.

pub mod io;
pub mod table;
pub mod values;

// Re-export commonly used types
pub use io::{QueryExecutor, RowInserter};
pub use table::{DescribedColumn, Row, TableRef};
pub use values::{CellValue, ColumnBatch};
