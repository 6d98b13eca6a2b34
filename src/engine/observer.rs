//! Execution observers
//!
//! Callbacks invoked by the scheduler when a vertex starts and completes.
//! `RecordingObserver` keeps the statistics so that `explain` can annotate
//! each vertex with its cost; `TracingObserver` logs them.

use crate::dag::{CubeQueryStep, StepId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How a vertex produced its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    /// Computed from its underlyings or the table
    Evaluated,
    /// Served by the step cache
    Cached,
    /// Not computed because the query was cancelled
    Skipped,
}

impl fmt::Display for StepSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluated => write!(f, "evaluated"),
            Self::Cached => write!(f, "cached"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Cost of one vertex
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepStats {
    pub source: StepSource,
    /// Slices in the output
    pub slices: usize,
    pub duration: Duration,
    /// Time spent past the cancellation instant, if any
    pub leaked: Option<Duration>,
}

impl fmt::Display for StepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} slices in {:.3}ms",
            self.source,
            self.slices,
            self.duration.as_secs_f64() * 1000.0
        )?;
        if let Some(leaked) = self.leaked {
            write!(f, ", leaked {}ms", leaked.as_millis())?;
        }
        Ok(())
    }
}

/// Vertex lifecycle callbacks
pub trait ExecutionObserver: Send + Sync {
    /// A vertex is about to run
    fn on_step_start(&self, _id: StepId, _step: &CubeQueryStep) {}

    /// A vertex produced its output
    fn on_step_complete(&self, _id: StepId, _step: &CubeQueryStep, _stats: &StepStats) {}
}

/// One vertex lifecycle callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Started(StepId),
    Completed(StepId),
}

/// Keeps the statistics of every completed vertex
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StepEvent>>,
    completed: Mutex<HashMap<StepId, StepStats>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertices in start order
    pub fn started(&self) -> Vec<StepId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                StepEvent::Started(id) => Some(*id),
                StepEvent::Completed(_) => None,
            })
            .collect()
    }

    /// Starts and completions in the order they happened
    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().clone()
    }

    /// Statistics of a completed vertex
    pub fn stats(&self, id: StepId) -> Option<StepStats> {
        self.completed.lock().get(&id).cloned()
    }

    /// Number of completed vertices
    pub fn completed(&self) -> usize {
        self.completed.lock().len()
    }

    /// Explain annotation for a vertex
    pub fn annotation(&self, id: StepId) -> Option<String> {
        self.stats(id).map(|stats| stats.to_string())
    }
}

impl ExecutionObserver for RecordingObserver {
    fn on_step_start(&self, id: StepId, _step: &CubeQueryStep) {
        self.events.lock().push(StepEvent::Started(id));
    }

    fn on_step_complete(&self, id: StepId, _step: &CubeQueryStep, stats: &StepStats) {
        self.completed.lock().insert(id, stats.clone());
        self.events.lock().push(StepEvent::Completed(id));
    }
}

/// Logs vertex lifecycle at debug level
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    query_id: Uuid,
}

impl TracingObserver {
    pub fn new(query_id: Uuid) -> Self {
        Self { query_id }
    }
}

impl ExecutionObserver for TracingObserver {
    fn on_step_start(&self, id: StepId, step: &CubeQueryStep) {
        tracing::debug!(query_id = %self.query_id, id, step = %step, "Step started");
    }

    fn on_step_complete(&self, id: StepId, step: &CubeQueryStep, stats: &StepStats) {
        tracing::debug!(
            query_id = %self.query_id,
            id,
            measure = step.measure_name(),
            source = %stats.source,
            slices = stats.slices,
            duration_ms = stats.duration.as_millis() as u64,
            "Step completed"
        );
    }
}

/// Forwards callbacks to several observers
#[derive(Default, Clone)]
pub(crate) struct ObserverSet {
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl ObserverSet {
    pub(crate) fn push(&mut self, observer: Arc<dyn ExecutionObserver>) {
        self.observers.push(observer);
    }
}

impl ExecutionObserver for ObserverSet {
    fn on_step_start(&self, id: StepId, step: &CubeQueryStep) {
        for observer in &self.observers {
            observer.on_step_start(id, step);
        }
    }

    fn on_step_complete(&self, id: StepId, step: &CubeQueryStep, stats: &StepStats) {
        for observer in &self.observers {
            observer.on_step_complete(id, step, stats);
        }
    }
}
