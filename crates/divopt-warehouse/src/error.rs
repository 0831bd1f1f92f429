use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The database file does not exist and the warehouse was opened read-only.
    #[error("database file '{}' does not exist; run `divopt init` or `divopt fetch` first", path.display())]
    MissingDatabase { path: PathBuf },

    /// The database exists but its schema has not been created.
    #[error("database schema is missing or outdated (expected migration '{expected}')")]
    SchemaMissing { expected: &'static str },

    /// A write was attempted through a read-only warehouse.
    #[error("warehouse is read-only")]
    ReadOnly,

    /// A record failed validation before it reached the database.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A query filter was rejected.
    #[error("query rejected: {0}")]
    QueryRejected(String),
}
