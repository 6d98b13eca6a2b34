//! Multi-type cells and columns
//!
//! Per-slice accumulation used while evaluating one DAG vertex:
//!
//! - **multitype**: `MultitypeCell`, a single accumulator with primitive fast paths
//! - **column**: `MultitypeColumn`, one cell per slice under one aggregation
//! - **output**: `SliceToValue`, the immutable result handed to parents and the cache

mod column;
mod multitype;
mod output;

pub use column::MultitypeColumn;
pub use multitype::{CellReader, MultitypeCell};
pub use output::SliceToValue;
