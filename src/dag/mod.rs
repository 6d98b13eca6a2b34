//! Query DAG
//!
//! Turns a `CubeQuery` into a deduplicated, acyclic graph of
//! `CubeQueryStep`s ready for scheduling.
//!
//! - **step**: queries, options and the step identity
//! - **builder**: measure resolution with filter and grouping pushdown
//! - **graph**: the resolved `QueryDag`
//! - **explain**: tree rendering with back-references

mod builder;
mod error;
mod explain;
mod graph;
mod step;

pub use builder::DagBuilder;
pub use error::{DagError, DagResult};
pub use graph::{QueryDag, StepId};
pub use step::{CubeQuery, CubeQueryBuilder, CubeQueryStep, MeasureRef, QueryOption};
