//! Query Engine
//!
//! This module runs cube queries:
//!
//! - **executor**: `CubeEngine` facade and per-execution context
//! - **scheduler**: Dependency-ordered, bounded-parallel DAG evaluation
//! - **evaluator**: Per-kind step semantics
//! - **observer**: Vertex lifecycle callbacks
//! - **result**: Result table and execution statistics
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! CubeQuery → DagBuilder → QueryDag
//!                             │
//!              Scheduler ─────┤ leaves first, ≤ max_concurrency in flight
//!                             │
//!       cancelled? → skip     │
//!       StepCache hit → reuse │
//!       otherwise → evaluate ─┴→ StepCache
//!                             │
//!                    root outputs → CubeResult
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use cubedag::config::Config;
//! use cubedag::dag::CubeQuery;
//! use cubedag::engine::CubeEngine;
//! use cubedag::measure::{Aggregation, Combination, Measure, MeasureForest};
//! use cubedag::table::InMemoryTable;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let forest = MeasureForest::builder("demo")
//!         .measure(Measure::aggregator("k1", "k1", Aggregation::Sum))
//!         .measure(Measure::aggregator("k2", "k2", Aggregation::Sum))
//!         .measure(Measure::combinator("k1PlusK2", ["k1", "k2"], Combination::Sum))
//!         .build()?;
//!     let table = InMemoryTable::from_rows("demo", vec![vec![("k1", 123), ("k2", 234)]]);
//!
//!     let engine = CubeEngine::new(Arc::new(forest), Arc::new(table), &Config::default());
//!     let result = engine
//!         .execute(&CubeQuery::builder().measure("k1PlusK2").build())
//!         .await?;
//!
//!     println!("{}", result.to_table_string());
//!     Ok(())
//! }
//! ```

mod error;
mod evaluator;
mod executor;
mod observer;
mod result;
mod scheduler;

pub use error::{EngineError, EngineResult};
pub use executor::{CubeEngine, ExecutionContext};
pub use observer::{
    ExecutionObserver, RecordingObserver, StepEvent, StepSource, StepStats, TracingObserver,
};
pub use result::{CubeResult, ExecutionStats, ResultRow};
pub use scheduler::Scheduler;
