//! Cache weighing policies

use crate::cell::SliceToValue;
use crate::config::WeigherKind;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Decides how much budget an output takes and whether it is worth caching
pub trait CacheWeigher: Debug + Send + Sync {
    /// Budget units taken by an output
    fn weigh(&self, output: &SliceToValue) -> usize;

    /// Whether an output computed in `cost` should be written back
    fn admit(&self, output: &SliceToValue, _cost: Duration, min_weight: usize) -> bool {
        self.weigh(output) >= min_weight
    }
}

/// One unit per slice
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceCountWeigher;

impl CacheWeigher for SliceCountWeigher {
    fn weigh(&self, output: &SliceToValue) -> usize {
        output.weight().max(1)
    }
}

/// One unit per slice, but outputs that were expensive to compute are
/// admitted even below the minimum weight
#[derive(Debug, Clone, Copy)]
pub struct CostAwareWeigher {
    /// Evaluation time above which any output is admitted
    pub min_cost: Duration,
}

impl Default for CostAwareWeigher {
    fn default() -> Self {
        Self {
            min_cost: Duration::from_millis(50),
        }
    }
}

impl CacheWeigher for CostAwareWeigher {
    fn weigh(&self, output: &SliceToValue) -> usize {
        output.weight().max(1)
    }

    fn admit(&self, output: &SliceToValue, cost: Duration, min_weight: usize) -> bool {
        cost >= self.min_cost || self.weigh(output) >= min_weight
    }
}

/// Weigher for a configured policy
pub fn weigher_for(kind: WeigherKind) -> Arc<dyn CacheWeigher> {
    match kind {
        WeigherKind::Slices => Arc::new(SliceCountWeigher),
        WeigherKind::CostAware => Arc::new(CostAwareWeigher::default()),
    }
}
