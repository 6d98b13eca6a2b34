//! Step cache
//!
//! Outputs of previously evaluated steps, shared between queries.

mod step_cache;
mod weigher;

pub use step_cache::{CacheStats, StepCache};
pub use weigher::{weigher_for, CacheWeigher, CostAwareWeigher, SliceCountWeigher};
