//! Measure definitions
//!
//! A `Measure` is an immutable, named computation. Its kind is a closed sum
//! type so that both DAG resolution and evaluation match on it exhaustively.

use crate::filter::Filter;
use crate::measure::aggregation::Aggregation;
use crate::measure::combination::Combination;
use crate::measure::error::{MeasureError, MeasureResult};
use crate::slice::GroupBy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A named measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Unique name within a forest
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What the measure computes
    #[serde(flatten)]
    pub kind: MeasureKind,
}

/// The closed set of measure kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasureKind {
    /// Leaf: aggregates a raw table column
    Aggregator {
        column: String,
        aggregation: Aggregation,
    },
    /// Merges K underlying measures slice by slice
    Combinator {
        underlyings: Vec<String>,
        combination: Combination,
    },
    /// ANDs an extra filter into the inherited one
    Filtrator { underlying: String, filter: Filter },
    /// Strips the constraints on some columns from the inherited filter
    Unfiltrator {
        underlying: String,
        columns: BTreeSet<String>,
    },
    /// Evaluates the underlying on a wider grouping, then re-aggregates
    Bucketor {
        underlying: String,
        group_by: GroupBy,
        aggregation: Aggregation,
    },
    /// Produces no value for any slice
    Empty,
}

impl Measure {
    /// Leaf measure aggregating a table column
    pub fn aggregator(
        name: impl Into<String>,
        column: impl Into<String>,
        aggregation: Aggregation,
    ) -> Self {
        Self::new(
            name,
            MeasureKind::Aggregator {
                column: column.into(),
                aggregation,
            },
        )
    }

    /// Measure combining several underlyings
    pub fn combinator<I, S>(name: impl Into<String>, underlyings: I, combination: Combination) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            MeasureKind::Combinator {
                underlyings: underlyings.into_iter().map(Into::into).collect(),
                combination,
            },
        )
    }

    /// Measure narrowing the filter of its underlying
    pub fn filtrator(name: impl Into<String>, underlying: impl Into<String>, filter: Filter) -> Self {
        Self::new(
            name,
            MeasureKind::Filtrator {
                underlying: underlying.into(),
                filter,
            },
        )
    }

    /// Measure widening the filter of its underlying
    pub fn unfiltrator<I, S>(name: impl Into<String>, underlying: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            MeasureKind::Unfiltrator {
                underlying: underlying.into(),
                columns: columns.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Measure re-aggregating its underlying from a wider grouping
    pub fn bucketor(
        name: impl Into<String>,
        underlying: impl Into<String>,
        group_by: GroupBy,
        aggregation: Aggregation,
    ) -> Self {
        Self::new(
            name,
            MeasureKind::Bucketor {
                underlying: underlying.into(),
                group_by,
                aggregation,
            },
        )
    }

    /// Measure producing nothing
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, MeasureKind::Empty)
    }

    fn new(name: impl Into<String>, kind: MeasureKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
        }
    }

    /// Builder method: set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name of the measure kind
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            MeasureKind::Aggregator { .. } => "Aggregator",
            MeasureKind::Combinator { .. } => "Combinator",
            MeasureKind::Filtrator { .. } => "Filtrator",
            MeasureKind::Unfiltrator { .. } => "Unfiltrator",
            MeasureKind::Bucketor { .. } => "Bucketor",
            MeasureKind::Empty => "Empty",
        }
    }

    /// Names of the measures this one depends on, in declaration order
    pub fn underlying_names(&self) -> Vec<&str> {
        match &self.kind {
            MeasureKind::Aggregator { .. } | MeasureKind::Empty => Vec::new(),
            MeasureKind::Combinator { underlyings, .. } => {
                underlyings.iter().map(String::as_str).collect()
            }
            MeasureKind::Filtrator { underlying, .. }
            | MeasureKind::Unfiltrator { underlying, .. }
            | MeasureKind::Bucketor { underlying, .. } => vec![underlying.as_str()],
        }
    }

    /// Check the definition is well-formed
    pub fn validate(&self) -> MeasureResult<()> {
        let invalid = |reason: String| MeasureError::Invalid {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }

        match &self.kind {
            MeasureKind::Aggregator { column, .. } if column.trim().is_empty() => {
                Err(invalid("aggregated column must not be empty".to_string()))
            }
            MeasureKind::Combinator { underlyings, .. } if underlyings.is_empty() => {
                Err(invalid("combinator needs at least one underlying".to_string()))
            }
            MeasureKind::Combinator {
                underlyings,
                combination,
            } => match combination.arity() {
                Some(arity) if arity != underlyings.len() => Err(invalid(format!(
                    "{} needs exactly {} underlyings, got {}",
                    combination,
                    arity,
                    underlyings.len()
                ))),
                _ => Ok(()),
            },
            MeasureKind::Unfiltrator { columns, .. } if columns.is_empty() => {
                Err(invalid("unfiltrator needs at least one column".to_string()))
            }
            MeasureKind::Bucketor { group_by, .. } if group_by.is_empty() => {
                Err(invalid("bucketor needs at least one grouping column".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MeasureKind::Aggregator {
                column,
                aggregation,
            } => write!(f, "Aggregator[{}({})]", aggregation, column),
            MeasureKind::Combinator { combination, .. } => write!(f, "Combinator[{}]", combination),
            MeasureKind::Filtrator { filter, .. } => write!(f, "Filtrator[{}]", filter),
            MeasureKind::Unfiltrator { columns, .. } => {
                let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                write!(f, "Unfiltrator[-{}]", columns.join(",-"))
            }
            MeasureKind::Bucketor {
                group_by,
                aggregation,
                ..
            } => write!(f, "Bucketor[{} by {}]", aggregation, group_by),
            MeasureKind::Empty => write!(f, "Empty"),
        }
    }
}
