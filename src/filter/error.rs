//! Filter error types

use thiserror::Error;

/// Errors that can occur while building or parsing filters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Filter expression could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// LIKE pattern could not be compiled
    #[error("Invalid LIKE pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type for filter operations
pub type FilterResult<T> = Result<T, FilterError>;
