//! Queries and DAG vertices
//!
//! A `CubeQuery` is what a caller asks for. Resolving it produces
//! `CubeQueryStep`s: one per distinct (measure, filter, groupBy, marker,
//! output-affecting options) tuple. Step identity drives both DAG
//! deduplication and the step cache, so `Hash` and `Eq` are written out by
//! hand over exactly those fields.

use crate::filter::Filter;
use crate::measure::Measure;
use crate::slice::GroupBy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Per-query switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOption {
    /// Resolve unknown measures to `Empty` instead of failing
    UnknownMeasuresAreEmpty,
    /// Attach the annotated DAG to the result
    Explain,
    /// Log every vertex start and completion
    Debug,
    /// Neither read from nor write to the step cache
    NoCache,
    /// Evaluate one vertex at a time
    Sequential,
}

impl QueryOption {
    /// Whether the option can change a step's output, and so belongs to its identity
    pub fn affects_step_output(&self) -> bool {
        matches!(self, Self::UnknownMeasuresAreEmpty)
    }
}

/// A requested measure: by name, or defined inline by the query
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureRef {
    /// A measure registered in the forest
    Named(String),
    /// A measure defined by the query itself
    Inline(Arc<Measure>),
}

impl MeasureRef {
    /// Name of the referenced measure
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Inline(measure) => &measure.name,
        }
    }
}

impl From<&str> for MeasureRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for MeasureRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Measure> for MeasureRef {
    fn from(measure: Measure) -> Self {
        Self::Inline(Arc::new(measure))
    }
}

/// A query over the cube
#[derive(Debug, Clone, Default)]
pub struct CubeQuery {
    /// Requested measures, in output column order
    pub measures: Vec<MeasureRef>,
    /// Top-level filter
    pub filter: Filter,
    /// Top-level grouping columns
    pub group_by: GroupBy,
    /// Opaque caller marker, part of every step's identity
    pub custom_marker: Option<String>,
    /// Query options
    pub options: BTreeSet<QueryOption>,
}

impl CubeQuery {
    /// Start building a query
    pub fn builder() -> CubeQueryBuilder {
        CubeQueryBuilder::default()
    }

    /// Check whether an option is set
    pub fn has_option(&self, option: QueryOption) -> bool {
        self.options.contains(&option)
    }
}

/// Builder for `CubeQuery`
#[derive(Debug, Default)]
pub struct CubeQueryBuilder {
    query: CubeQuery,
}

impl CubeQueryBuilder {
    /// Request a measure
    pub fn measure(mut self, measure: impl Into<MeasureRef>) -> Self {
        self.query.measures.push(measure.into());
        self
    }

    /// Request several measures
    pub fn measures<I, M>(mut self, measures: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MeasureRef>,
    {
        self.query.measures.extend(measures.into_iter().map(Into::into));
        self
    }

    /// Set the filter
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = filter;
        self
    }

    /// Set the grouping columns
    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.query.group_by = group_by;
        self
    }

    /// Set the custom marker
    pub fn custom_marker(mut self, marker: impl Into<String>) -> Self {
        self.query.custom_marker = Some(marker.into());
        self
    }

    /// Set an option
    pub fn option(mut self, option: QueryOption) -> Self {
        self.query.options.insert(option);
        self
    }

    /// Finish the query
    pub fn build(self) -> CubeQuery {
        self.query
    }
}

/// One DAG vertex
#[derive(Debug, Clone)]
pub struct CubeQueryStep {
    /// Measure evaluated by this step
    pub measure: Arc<Measure>,
    /// Filter inherited through resolution
    pub filter: Filter,
    /// Grouping columns inherited through resolution
    pub group_by: GroupBy,
    /// Opaque caller marker
    pub custom_marker: Option<String>,
    /// Options that can change this step's output
    pub options: BTreeSet<QueryOption>,
}

impl CubeQueryStep {
    /// Create a step, keeping only the options that affect its output
    pub fn new(
        measure: Arc<Measure>,
        filter: Filter,
        group_by: GroupBy,
        custom_marker: Option<String>,
        options: &BTreeSet<QueryOption>,
    ) -> Self {
        Self {
            measure,
            filter,
            group_by,
            custom_marker,
            options: options
                .iter()
                .copied()
                .filter(QueryOption::affects_step_output)
                .collect(),
        }
    }

    /// Name of the measure
    pub fn measure_name(&self) -> &str {
        &self.measure.name
    }
}

impl PartialEq for CubeQueryStep {
    fn eq(&self, other: &Self) -> bool {
        self.measure.name == other.measure.name
            && self.filter == other.filter
            && self.group_by == other.group_by
            && self.custom_marker == other.custom_marker
            && self.options == other.options
            && (Arc::ptr_eq(&self.measure, &other.measure) || self.measure == other.measure)
    }
}

impl Eq for CubeQueryStep {}

impl Hash for CubeQueryStep {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.measure.name.hash(state);
        self.filter.hash(state);
        self.group_by.hash(state);
        self.custom_marker.hash(state);
        self.options.hash(state);
    }
}

impl fmt::Display for CubeQueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m={}({}) filter={} groupBy={}",
            self.measure.name, self.measure, self.filter, self.group_by
        )?;
        if let Some(marker) = &self.custom_marker {
            write!(f, " marker={}", marker)?;
        }
        Ok(())
    }
}
