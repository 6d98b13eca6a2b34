//! DAG Builder
//!
//! Resolves requested measures into a `QueryDag`. Each measure kind decides
//! the filter and grouping pushed to its underlyings:
//!
//! | Kind        | Underlying filter              | Underlying groupBy        |
//! |-------------|--------------------------------|---------------------------|
//! | Combinator  | unchanged                      | unchanged                 |
//! | Filtrator   | `and(filter, measure filter)`  | unchanged                 |
//! | Unfiltrator | filter without named columns   | unchanged                 |
//! | Bucketor    | unchanged                      | `union(groupBy, buckets)` |
//!
//! Structurally equal steps are created once and shared. Cycles are detected
//! on the measure-name path from the root, before anything is evaluated.

use crate::dag::error::{DagError, DagResult};
use crate::dag::graph::{QueryDag, StepId};
use crate::dag::step::{CubeQuery, CubeQueryStep, MeasureRef, QueryOption};
use crate::filter::Filter;
use crate::measure::{Measure, MeasureForest, MeasureKind};
use crate::slice::GroupBy;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Builds a `QueryDag` for one query
pub struct DagBuilder<'a> {
    forest: &'a MeasureForest,
    inline: HashMap<String, Arc<Measure>>,
    unknown_as_empty: bool,
    custom_marker: Option<String>,
    options: BTreeSet<QueryOption>,
    path: Vec<String>,
    dag: QueryDag,
}

impl<'a> DagBuilder<'a> {
    /// Create a builder resolving against a forest
    pub fn new(forest: &'a MeasureForest) -> Self {
        Self {
            forest,
            inline: HashMap::new(),
            unknown_as_empty: false,
            custom_marker: None,
            options: BTreeSet::new(),
            path: Vec::new(),
            dag: QueryDag::default(),
        }
    }

    /// Resolve a query into its DAG
    pub fn build(forest: &'a MeasureForest, query: &CubeQuery) -> DagResult<QueryDag> {
        let mut builder = Self::new(forest);
        builder.unknown_as_empty = query.has_option(QueryOption::UnknownMeasuresAreEmpty);
        builder.custom_marker = query.custom_marker.clone();
        builder.options = query.options.clone();

        for measure in &query.measures {
            if let MeasureRef::Inline(inline) = measure {
                builder.register_inline(inline.clone())?;
            }
        }

        for measure in &query.measures {
            let resolved = builder.lookup(measure.name(), None)?;
            let id = builder.resolve(resolved, query.filter.clone(), query.group_by.clone())?;
            if !builder.dag.roots.contains(&id) {
                builder.dag.roots.push(id);
            }
        }

        tracing::debug!(
            roots = builder.dag.roots.len(),
            steps = builder.dag.len(),
            "Query DAG built"
        );

        Ok(builder.dag)
    }

    fn register_inline(&mut self, measure: Arc<Measure>) -> DagResult<()> {
        measure.validate()?;

        let registered = self
            .inline
            .get(&measure.name)
            .or_else(|| self.forest.get(&measure.name));
        if let Some(existing) = registered {
            if existing.as_ref() != measure.as_ref() {
                return Err(DagError::ConflictingDefinition(measure.name.clone()));
            }
        }

        self.inline.insert(measure.name.clone(), measure);
        Ok(())
    }

    fn lookup(&self, name: &str, referenced_by: Option<&str>) -> DagResult<Arc<Measure>> {
        if let Some(measure) = self.inline.get(name).or_else(|| self.forest.get(name)) {
            return Ok(measure.clone());
        }

        if self.unknown_as_empty {
            tracing::debug!(measure = name, "Unknown measure resolved as empty");
            return Ok(Arc::new(Measure::empty(name)));
        }

        Err(DagError::UnknownMeasure {
            name: name.to_string(),
            referenced_by: referenced_by.map(str::to_string),
        })
    }

    fn resolve(&mut self, measure: Arc<Measure>, filter: Filter, group_by: GroupBy) -> DagResult<StepId> {
        if let Some(position) = self.path.iter().position(|n| *n == measure.name) {
            let mut path = self.path[position..].to_vec();
            path.push(measure.name.clone());
            return Err(DagError::Cycle { path });
        }

        let step = CubeQueryStep::new(
            measure.clone(),
            filter,
            group_by,
            self.custom_marker.clone(),
            &self.options,
        );
        if let Some(id) = self.dag.find(&step) {
            return Ok(id);
        }

        self.path.push(measure.name.clone());
        let underlyings = self.resolve_underlyings(&step);
        self.path.pop();
        let underlyings = underlyings?;

        Ok(self.dag.push(Arc::new(step), underlyings))
    }

    fn resolve_underlyings(&mut self, step: &CubeQueryStep) -> DagResult<Vec<StepId>> {
        let name = step.measure.name.as_str();

        let contexts: Vec<(&str, Filter, GroupBy)> = match &step.measure.kind {
            MeasureKind::Aggregator { .. } | MeasureKind::Empty => Vec::new(),
            MeasureKind::Combinator { underlyings, .. } => underlyings
                .iter()
                .map(|u| (u.as_str(), step.filter.clone(), step.group_by.clone()))
                .collect(),
            MeasureKind::Filtrator { underlying, filter } => vec![(
                underlying.as_str(),
                Filter::and([step.filter.clone(), filter.clone()]),
                step.group_by.clone(),
            )],
            MeasureKind::Unfiltrator {
                underlying,
                columns,
            } => vec![(
                underlying.as_str(),
                step.filter.strip_columns(columns),
                step.group_by.clone(),
            )],
            MeasureKind::Bucketor {
                underlying,
                group_by,
                ..
            } => vec![(
                underlying.as_str(),
                step.filter.clone(),
                step.group_by.union(group_by),
            )],
        };

        let mut ids = Vec::with_capacity(contexts.len());
        for (underlying, filter, group_by) in contexts {
            let measure = self.lookup(underlying, Some(name))?;
            ids.push(self.resolve(measure, filter, group_by)?);
        }
        Ok(ids)
    }
}
