//! Measure error types
//!
//! Defines the errors raised while defining measures and building forests.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while registering measures
#[derive(Error, Debug)]
pub enum MeasureError {
    /// Two measures share a name within one forest
    #[error("Duplicate measure: {0}")]
    Duplicate(String),

    /// A measure definition is malformed
    #[error("Invalid measure '{name}': {reason}")]
    Invalid { name: String, reason: String },

    /// An operator name could not be parsed
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// A measure file could not be parsed
    #[error("Failed to parse measures: {0}")]
    Parse(String),

    /// A measure file could not be read
    #[error("Failed to read measure file {path:?}: {error}")]
    Io { path: PathBuf, error: String },
}

/// Result type for measure operations
pub type MeasureResult<T> = Result<T, MeasureError>;
