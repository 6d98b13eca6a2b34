//! Engine error types

use crate::dag::DagError;
use crate::table::TableError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that fail a query
#[derive(Error, Debug)]
pub enum EngineError {
    /// The query could not be resolved into a DAG
    #[error(transparent)]
    Dag(#[from] DagError),

    /// The table connector failed while feeding a leaf
    #[error("Query {query_id}: table error while evaluating '{measure}': {source}")]
    Table {
        query_id: Uuid,
        measure: String,
        #[source]
        source: TableError,
    },

    /// A worker task panicked or was aborted
    #[error("Query {query_id}: worker failed: {reason}")]
    Worker { query_id: Uuid, reason: String },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
