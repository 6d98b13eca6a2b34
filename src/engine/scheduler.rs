//! Scheduler
//!
//! Evaluates a `QueryDag` leaves first:
//!
//! 1. walking down from the roots, serve vertices from the step cache;
//!    vertices only reachable through hits are never run
//! 2. a remaining vertex becomes ready once every distinct underlying has
//!    produced its output; ready vertices run as tokio tasks, at most
//!    `max_concurrency` at a time
//! 3. each task skips its vertex (empty output) if the query is cancelled,
//!    otherwise evaluates it and writes the output back to the cache
//!
//! Once every parent of a non-root vertex has consumed its output, the output
//! is released.

use crate::cache::StepCache;
use crate::cell::SliceToValue;
use crate::dag::{CubeQueryStep, QueryDag, StepId};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::evaluator::{evaluate, EvalContext};
use crate::engine::observer::{ExecutionObserver, StepSource, StepStats};
use crate::engine::result::ExecutionStats;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Everything a vertex task needs
pub(crate) struct RunContext {
    pub eval: EvalContext,
    pub cache: Option<Arc<StepCache>>,
    pub observer: Arc<dyn ExecutionObserver>,
}

/// Outputs of the requested vertices
pub(crate) struct RunOutput {
    pub roots: HashMap<StepId, Arc<SliceToValue>>,
    pub stats: ExecutionStats,
}

/// Runs DAGs with bounded parallelism
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    max_concurrency: usize,
}

impl Scheduler {
    /// Create a scheduler running at most `max_concurrency` vertices at once
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Maximum number of vertices in flight
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub(crate) async fn run(&self, dag: &QueryDag, ctx: Arc<RunContext>) -> EngineResult<RunOutput> {
        let n = dag.len();
        let distinct: Vec<Vec<StepId>> = (0..n)
            .map(|id| {
                let mut seen = HashSet::new();
                dag.underlyings(id)
                    .iter()
                    .copied()
                    .filter(|u| seen.insert(*u))
                    .collect()
            })
            .collect();

        let mut stats = ExecutionStats {
            steps: n,
            ..ExecutionStats::default()
        };
        let mut outputs: Vec<Option<Arc<SliceToValue>>> = vec![None; n];
        let mut live = 0usize;

        // Cache lookups run from the roots down so that nothing below a hit
        // is evaluated. Parents always have higher ids than their underlyings.
        let mut needed = vec![false; n];
        let mut active = vec![false; n];
        for &root in dag.roots() {
            needed[root] = true;
        }
        for id in (0..n).rev() {
            if !needed[id] {
                continue;
            }
            if let Some(cached) = lookup(id, dag.step(id), &ctx) {
                outputs[id] = Some(cached);
                live += 1;
                stats.cached += 1;
                continue;
            }
            active[id] = true;
            for &u in &distinct[id] {
                needed[u] = true;
            }
        }
        stats.pruned = needed.iter().filter(|needed| !**needed).count();

        let mut pending: Vec<usize> = (0..n)
            .map(|id| distinct[id].iter().filter(|&&u| active[u]).count())
            .collect();
        let mut consumers = vec![0usize; n];
        for id in (0..n).filter(|&id| active[id]) {
            for &u in &distinct[id] {
                consumers[u] += 1;
            }
        }
        let mut ready: VecDeque<StepId> = (0..n).filter(|&id| active[id] && pending[id] == 0).collect();
        let total = active.iter().filter(|active| **active).count();
        stats.peak_outputs = live;

        let mut tasks: JoinSet<(StepId, EngineResult<(Arc<SliceToValue>, StepStats)>)> = JoinSet::new();
        let mut completed = 0usize;

        while completed < total {
            while tasks.len() < self.max_concurrency {
                let Some(id) = ready.pop_front() else { break };

                let mut inputs = Vec::with_capacity(dag.underlyings(id).len());
                for &u in dag.underlyings(id) {
                    match &outputs[u] {
                        Some(output) => inputs.push(output.clone()),
                        None => {
                            return Err(EngineError::Worker {
                                query_id: ctx.eval.query_id,
                                reason: format!("output of step #{} missing for step #{}", u, id),
                            })
                        }
                    }
                }

                let step = dag.step(id).clone();
                let ctx = ctx.clone();
                tasks.spawn(async move {
                    let result = run_step(id, &step, &inputs, &ctx).await;
                    (id, result)
                });
            }

            let joined = match tasks.join_next().await {
                Some(joined) => joined,
                None => {
                    return Err(EngineError::Worker {
                        query_id: ctx.eval.query_id,
                        reason: format!("no runnable step, {} of {} completed", completed, total),
                    })
                }
            };

            let (id, result) = joined.map_err(|e| EngineError::Worker {
                query_id: ctx.eval.query_id,
                reason: e.to_string(),
            })?;
            let (output, step_stats) = match result {
                Ok(done) => done,
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            };

            match step_stats.source {
                StepSource::Evaluated => stats.evaluated += 1,
                StepSource::Cached => stats.cached += 1,
                StepSource::Skipped => stats.skipped += 1,
            }
            if step_stats.leaked.is_some() {
                stats.leaked += 1;
            }

            outputs[id] = Some(output);
            live += 1;
            completed += 1;

            for &u in &distinct[id] {
                consumers[u] -= 1;
                if consumers[u] == 0 && !dag.is_root(u) && outputs[u].take().is_some() {
                    live -= 1;
                }
            }
            stats.peak_outputs = stats.peak_outputs.max(live);

            for &parent in dag.parents(id) {
                if !active[parent] {
                    continue;
                }
                pending[parent] -= 1;
                if pending[parent] == 0 {
                    ready.push_back(parent);
                }
            }
        }

        let roots = dag
            .roots()
            .iter()
            .filter_map(|&id| outputs[id].take().map(|output| (id, output)))
            .collect();

        Ok(RunOutput { roots, stats })
    }
}

/// Serve a vertex from the step cache, reporting it to the observer on a hit
fn lookup(id: StepId, step: &Arc<CubeQueryStep>, ctx: &RunContext) -> Option<Arc<SliceToValue>> {
    if ctx.eval.cancellation.is_cancelled() {
        return None;
    }
    let cached = ctx.cache.as_ref()?.get(step)?;

    ctx.observer.on_step_start(id, step);
    ctx.observer.on_step_complete(
        id,
        step,
        &StepStats {
            source: StepSource::Cached,
            slices: cached.len(),
            duration: Duration::ZERO,
            leaked: None,
        },
    );
    Some(cached)
}

async fn run_step(
    id: StepId,
    step: &Arc<CubeQueryStep>,
    inputs: &[Arc<SliceToValue>],
    ctx: &RunContext,
) -> EngineResult<(Arc<SliceToValue>, StepStats)> {
    ctx.observer.on_step_start(id, step);
    let start = Instant::now();
    let cancellation = &ctx.eval.cancellation;

    let (output, source, leaked) = if cancellation.is_cancelled() {
        (Arc::default(), StepSource::Skipped, None)
    } else {
        let output = evaluate(step, inputs, &ctx.eval).await?;
        let leaked = cancellation.report_leak(step.measure_name());
        // a scan cut short by cancellation may be partial
        if leaked.is_none() {
            if let Some(cache) = &ctx.cache {
                cache.put_with_cost(step.clone(), output.clone(), start.elapsed());
            }
        }
        (output, StepSource::Evaluated, leaked)
    };

    let stats = StepStats {
        source,
        slices: output.len(),
        duration: start.elapsed(),
        leaked,
    };
    ctx.observer.on_step_complete(id, step, &stats);
    Ok((output, stats))
}
