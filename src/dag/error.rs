//! DAG resolution errors

use crate::measure::MeasureError;
use thiserror::Error;

/// Errors raised while resolving a query into a DAG
#[derive(Error, Debug)]
pub enum DagError {
    /// A measure name is not registered
    #[error("Unknown measure '{name}'{}", .referenced_by.as_ref().map(|r| format!(" (referenced by '{}')", r)).unwrap_or_default())]
    UnknownMeasure {
        name: String,
        referenced_by: Option<String>,
    },

    /// A measure depends on itself
    #[error("Cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// An inline measure collides with a different definition of the same name
    #[error("Conflicting definitions for measure '{0}'")]
    ConflictingDefinition(String),

    /// An inline measure is malformed
    #[error("Invalid measure: {0}")]
    InvalidMeasure(#[from] MeasureError),
}

/// Result type for DAG operations
pub type DagResult<T> = Result<T, DagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DagError::UnknownMeasure {
            name: "k3".to_string(),
            referenced_by: None,
        };
        assert_eq!(err.to_string(), "Unknown measure 'k3'");

        let err = DagError::UnknownMeasure {
            name: "k3".to_string(),
            referenced_by: Some("ratio".to_string()),
        };
        assert_eq!(err.to_string(), "Unknown measure 'k3' (referenced by 'ratio')");

        let err = DagError::Cycle {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Cycle detected: a -> b -> a");
    }
}
