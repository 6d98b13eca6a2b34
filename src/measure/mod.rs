//! Measures
//!
//! Named computations and the registry holding them.
//!
//! - **types**: `Measure` and the closed set of `MeasureKind`s
//! - **aggregation**: reduce operators used by aggregators and bucketors
//! - **combination**: N-ary functions used by combinators
//! - **forest**: the immutable, name-unique registry

mod aggregation;
mod combination;
mod error;
mod forest;
mod types;

pub use aggregation::Aggregation;
pub use combination::Combination;
pub use error::{MeasureError, MeasureResult};
pub use forest::{MeasureForest, MeasureForestBuilder};
pub use types::{Measure, MeasureKind};
