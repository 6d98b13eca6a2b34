//! Table connector errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by table connectors
#[derive(Error, Debug)]
pub enum TableError {
    /// A table file could not be read
    #[error("Failed to read table {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    /// Malformed CSV input
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The backend failed while scanning
    #[error("Table backend error: {0}")]
    Backend(String),
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;
