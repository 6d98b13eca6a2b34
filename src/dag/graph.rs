//! Resolved query DAG

use crate::dag::step::CubeQueryStep;
use std::collections::HashMap;
use std::sync::Arc;

/// Index of a vertex within its `QueryDag`
pub type StepId = usize;

/// Deduplicated, acyclic graph of steps.
///
/// Steps are stored in topological order: every step comes after all of its
/// underlyings.
#[derive(Debug, Clone, Default)]
pub struct QueryDag {
    pub(crate) steps: Vec<Arc<CubeQueryStep>>,
    pub(crate) underlyings: Vec<Vec<StepId>>,
    pub(crate) parents: Vec<Vec<StepId>>,
    pub(crate) roots: Vec<StepId>,
    pub(crate) index: HashMap<Arc<CubeQueryStep>, StepId>,
}

impl QueryDag {
    /// Number of vertices
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check for a DAG without vertices
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step of a vertex
    pub fn step(&self, id: StepId) -> &Arc<CubeQueryStep> {
        &self.steps[id]
    }

    /// All steps in topological order
    pub fn steps(&self) -> impl Iterator<Item = (StepId, &Arc<CubeQueryStep>)> {
        self.steps.iter().enumerate()
    }

    /// Underlyings of a vertex, positional (one per declared underlying)
    pub fn underlyings(&self, id: StepId) -> &[StepId] {
        &self.underlyings[id]
    }

    /// Distinct vertices consuming this one
    pub fn parents(&self, id: StepId) -> &[StepId] {
        &self.parents[id]
    }

    /// Requested vertices, in request order
    pub fn roots(&self) -> &[StepId] {
        &self.roots
    }

    /// Check whether a vertex is requested
    pub fn is_root(&self, id: StepId) -> bool {
        self.roots.contains(&id)
    }

    /// Vertex of a structurally equal step
    pub fn find(&self, step: &CubeQueryStep) -> Option<StepId> {
        self.index.get(step).copied()
    }

    /// Vertices without underlyings
    pub fn leaves(&self) -> Vec<StepId> {
        (0..self.steps.len())
            .filter(|&id| self.underlyings[id].is_empty())
            .collect()
    }

    pub(crate) fn push(&mut self, step: Arc<CubeQueryStep>, underlyings: Vec<StepId>) -> StepId {
        let id = self.steps.len();
        for &child in &underlyings {
            if !self.parents[child].contains(&id) {
                self.parents[child].push(id);
            }
        }
        self.index.insert(step.clone(), id);
        self.steps.push(step);
        self.underlyings.push(underlyings);
        self.parents.push(Vec::new());
        id
    }
}
