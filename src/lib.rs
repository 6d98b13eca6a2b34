//! # Cubedag
//!
//! Embedded analytical query engine. A query names measures, a filter and a
//! set of grouping columns; the engine resolves the measures into a
//! deduplicated DAG of steps and evaluates it against a tabular source.
//!
//! ## Features
//!
//! - **Measure forest**: aggregators, combinators, filtrators, unfiltrators and bucketors
//! - **Deduplicated DAG**: shared sub-computations are evaluated once per query
//! - **Parallel scheduling**: dependency-ordered, bounded concurrency on tokio
//! - **Multi-type cells**: long/double fast paths with exact promotion to objects
//! - **Step cache**: cross-query reuse of step outputs with weighted LRU eviction
//! - **Cancellation**: cooperative, with leaked-work reporting
//!
//! ## Modules
//!
//! - [`value`] / [`slice`]: values, slices and grouping columns
//! - [`filter`]: filter AST and textual syntax
//! - [`measure`]: measure definitions and the forest
//! - [`dag`]: query steps and DAG construction
//! - [`cell`]: per-slice accumulation
//! - [`table`]: table connectors
//! - [`cache`]: step output cache
//! - [`engine`]: scheduling, evaluation and results
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cubedag::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let forest = MeasureForest::from_toml_str(r#"
//!         [[measures]]
//!         name = "k1"
//!         kind = "aggregator"
//!         column = "k1"
//!         aggregation = "sum"
//!     "#)?;
//!     let table = InMemoryTable::from_rows("base", vec![vec![("k1", 123)], vec![("k1", 345)]]);
//!
//!     let engine = CubeEngine::new(Arc::new(forest), Arc::new(table), &Config::default());
//!     let query = CubeQuery::builder()
//!         .measure("k1")
//!         .filter(parse_filter("k1 > 200")?)
//!         .build();
//!
//!     let result = engine.execute(&query).await?;
//!     println!("{}", result.to_table_string());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancellation;
pub mod cell;
pub mod config;
pub mod dag;
pub mod engine;
pub mod filter;
pub mod measure;
pub mod slice;
pub mod table;
pub mod value;

// Re-export top-level types for convenience
pub use value::Value;

pub use slice::{GroupBy, Slice};

pub use filter::{parse_filter, Filter, FilterError};

pub use measure::{Aggregation, Combination, Measure, MeasureError, MeasureForest, MeasureKind};

pub use dag::{CubeQuery, CubeQueryStep, DagBuilder, DagError, QueryDag, QueryOption};

pub use cache::{CacheStats, StepCache};

pub use cancellation::Cancellation;

pub use table::{InMemoryTable, TableConnector, TableError};

pub use engine::{CubeEngine, CubeResult, EngineError, EngineResult, ExecutionContext};

pub use config::{Config, ConfigError};
