//! Custom error types for `chprep` operations.
//!
//! This module provides structured error handling using `thiserror`. Each concern
//! (classification, schema retrieval, query execution, coercion, configuration) has
//! its own enum; [`PrepError`] composes them. Type-string parse failures are not part
//! of this taxonomy: the parser reports them as an absent result.

use thiserror::Error;

/// Root error of `chprep` operations.
///
/// Each variant wraps one concern's error and displays it unchanged.
#[derive(Debug, Error)]
pub enum PrepError {
    /// Column classification errors (array/map arity, unparseable types)
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    /// Table lookup and schema retrieval errors
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Query execution errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Value coercion errors
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic errors from collaborators
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Classification errors.
///
/// Fatal for the column being classified; the schema resolver decides whether
/// the whole resolution aborts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    /// The type string could not be parsed
    #[error("Column '{column}' has an unparseable type: {raw_type}")]
    Unparseable {
        /// The column name
        column: String,
        /// The raw type string
        raw_type: String,
    },

    /// An array type without exactly one element type
    #[error("Invalid array type definition for column '{column}': {raw_type}")]
    InvalidArray {
        /// The column name
        column: String,
        /// The raw type string
        raw_type: String,
    },

    /// A map type without a key and a value type
    #[error("Invalid map type definition for column '{column}': {raw_type}")]
    InvalidMap {
        /// The column name
        column: String,
        /// The raw type string
        raw_type: String,
    },
}

/// Table lookup and schema errors.
///
/// All of these abort the whole resolve or profile operation.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The table does not exist in the database
    #[error("Table {database}.`{table}` does not exist")]
    TableNotFound {
        /// The database name
        database: String,
        /// The table name
        table: String,
    },

    /// The schema (or table list) could not be retrieved
    #[error("Could not retrieve schema for table {table}: {message}")]
    Retrieval {
        /// The qualified table name
        table: String,
        /// What went wrong
        message: String,
    },

    /// The first member of a dotted family could not be classified
    #[error("Cannot group family '{family}': {source}")]
    FamilyRoot {
        /// The family (parent) name
        family: String,
        /// The classification failure of its first member
        #[source]
        source: ClassificationError,
    },
}

/// Query execution errors.
///
/// Recoverable per batch while profiling; fatal for the row count.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The collaborator raised while executing the query
    #[error("Query execution failed: {source}")]
    Execution {
        /// The query text
        query: String,
        /// The underlying transport error
        #[source]
        source: anyhow::Error,
    },

    /// The result did not have the shape the query projects
    #[error("Unexpected result shape: expected {expected}, found {found}")]
    UnexpectedShape {
        /// What the query projects
        expected: String,
        /// What came back
        found: String,
    },

    /// Insert into the target table failed
    #[error("Insert into {table} failed: {source}")]
    Insert {
        /// The qualified table name
        table: String,
        /// The underlying transport error
        #[source]
        source: anyhow::Error,
    },
}

/// Value coercion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    /// A required scalar value could not be converted to the column's type
    #[error("Column '{column}' requires a {expected} value, found {found}")]
    Unconvertible {
        /// The column name
        column: String,
        /// Expected value kind
        expected: String,
        /// Description of the value found
        found: String,
    },
}

/// Invalid profiling or preparation options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// Options reference a column the schema does not have
    #[error("Unknown column '{column}' referenced by {option}")]
    UnknownColumn {
        /// The option name
        option: String,
        /// The missing column
        column: String,
    },
}

/// Type alias for Results using `PrepError`.
pub type Result<T> = std::result::Result<T, PrepError>;

impl PrepError {
    /// Message suitable for end users.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Classification(e) => format!("Type error: {e}"),
            Self::Schema(e) => e.user_message(),
            Self::Query(e) => format!("Query error: {e}"),
            Self::Coercion(e) => format!("Coercion error: {e}"),
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Other(e) => format!("Error: {e}"),
        }
    }

    /// A hint on how to fix the cause, where one exists.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Schema(e) => e.recovery_suggestion(),
            Self::Coercion(_) => Some(
                "Make the column Nullable or fix the upstream value before inserting."
                    .to_string(),
            ),
            Self::Classification(_) => {
                Some("Check the column type string as reported by DESCRIBE TABLE.".to_string())
            },
            _ => None,
        }
    }

    /// Returns `true` if the failure only affects part of an operation.
    ///
    /// Recoverable errors only affect part of an operation (one profiling batch,
    /// one column) and can be skipped.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Query(QueryError::Execution { .. } | QueryError::UnexpectedShape { .. })
                | Self::Classification(_)
        )
    }
}

impl SchemaError {
    fn user_message(&self) -> String {
        match self {
            Self::TableNotFound { database, table } => {
                format!("Table '{table}' was not found in database '{database}'.")
            },
            Self::Retrieval { .. } | Self::FamilyRoot { .. } => self.to_string(),
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::TableNotFound { .. } => {
                Some("Check the database and table names, and the user's grants.".to_string())
            },
            Self::FamilyRoot { .. } => Some(
                "Fix the type of the first column of the family; later members depend on it."
                    .to_string(),
            ),
            Self::Retrieval { .. } => None,
        }
    }
}
