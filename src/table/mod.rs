//! Table connectors
//!
//! The boundary between the engine and the physical data. Aggregator leaves
//! ask a `TableConnector` for the rows matching a filter, projected onto the
//! grouping columns and the aggregated columns. Connectors are expected to
//! poll the query's `Cancellation` between row batches.

mod error;
mod memory;

pub use error::{TableError, TableResult};
pub use memory::InMemoryTable;

use crate::cancellation::Cancellation;
use crate::filter::Filter;
use crate::slice::{Columns, GroupBy, Slice};
use crate::value::Value;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// Pseudo-column whose value is 1 for every row
pub const COUNT_ASTERISK: &str = "*";

/// Lazy, finite sequence of rows
pub type TableStream = BoxStream<'static, TableResult<TableRow>>;

/// What a leaf asks the table for
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    pub filter: Filter,
    pub group_by: GroupBy,
    pub aggregated_columns: Vec<String>,
}

impl TableQuery {
    /// Project a matching row onto the grouping and aggregated columns
    pub fn project<R: Columns + ?Sized>(&self, row: &R) -> TableRow {
        TableRow {
            slice: Slice::from_row(row, &self.group_by),
            values: self
                .aggregated_columns
                .iter()
                .map(|column| {
                    if column == COUNT_ASTERISK {
                        Some(Value::Long(1))
                    } else {
                        row.column(column).filter(|v| !v.is_null()).cloned()
                    }
                })
                .collect(),
        }
    }
}

/// One row as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// Coordinates on the query's grouping columns
    pub slice: Slice,
    /// One entry per aggregated column, `None` when absent
    pub values: Vec<Option<Value>>,
}

/// Source of raw rows
#[async_trait]
pub trait TableConnector: Send + Sync {
    /// Name of the table
    fn name(&self) -> &str;

    /// Stream the rows matching `query.filter`
    async fn stream_slices(
        &self,
        query: TableQuery,
        cancellation: Arc<Cancellation>,
    ) -> TableResult<TableStream>;
}
