//! Slices and grouping columns
//!
//! A `Slice` is one output coordinate: an ordered mapping from grouping column
//! to value. The grand total is the empty slice. `GroupBy` is the ordered set
//! of grouping columns a slice is keyed on.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Read access to named columns, shared by table rows and slices
pub trait Columns {
    /// Value of a column, if present
    fn column(&self, name: &str) -> Option<&Value>;
}

impl Columns for BTreeMap<String, Value> {
    fn column(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Columns for HashMap<String, Value> {
    fn column(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Ordered set of grouping columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct GroupBy {
    columns: BTreeSet<String>,
}

impl GroupBy {
    /// The grand total (no grouping column)
    pub fn grand_total() -> Self {
        Self::default()
    }

    /// Group by the given columns
    pub fn of<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Check for the grand total
    pub fn is_grand_total(&self) -> bool {
        self.columns.is_empty()
    }

    /// Grouping columns in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Number of grouping columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check for no grouping column
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Check whether a column is grouped on
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Union of both column sets
    pub fn union(&self, other: &GroupBy) -> GroupBy {
        GroupBy {
            columns: self.columns.union(&other.columns).cloned().collect(),
        }
    }

    /// Check whether every column of `self` is in `other`
    pub fn is_subset(&self, other: &GroupBy) -> bool {
        self.columns.is_subset(&other.columns)
    }
}

impl From<Vec<String>> for GroupBy {
    fn from(columns: Vec<String>) -> Self {
        GroupBy::of(columns)
    }
}

impl From<GroupBy> for Vec<String> {
    fn from(group_by: GroupBy) -> Self {
        group_by.columns.into_iter().collect()
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "grandTotal");
        }
        let columns: Vec<&str> = self.columns().collect();
        write!(f, "[{}]", columns.join(","))
    }
}

/// One output coordinate
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Slice {
    coordinates: BTreeMap<String, Value>,
}

impl Slice {
    /// The grand total slice
    pub fn grand_total() -> Self {
        Self::default()
    }

    /// Build a slice from (column, value) pairs
    pub fn of<I, K, V>(coordinates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            coordinates: coordinates
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Build the slice of a row for the given grouping columns.
    ///
    /// A column missing from the row lands on the `Null` coordinate.
    pub fn from_row<R: Columns + ?Sized>(row: &R, group_by: &GroupBy) -> Self {
        Self {
            coordinates: group_by
                .columns()
                .map(|c| (c.to_string(), row.column(c).cloned().unwrap_or(Value::Null)))
                .collect(),
        }
    }

    /// Coordinate for a column
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.coordinates.get(column)
    }

    /// Iterate coordinates in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.coordinates.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of coordinates
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    /// Check for the grand total slice
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Grouping columns of this slice
    pub fn group_by(&self) -> GroupBy {
        GroupBy::of(self.coordinates.keys().cloned())
    }

    /// Keep only the coordinates of the given grouping columns
    pub fn project(&self, group_by: &GroupBy) -> Slice {
        Slice {
            coordinates: self
                .coordinates
                .iter()
                .filter(|(k, _)| group_by.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl Columns for Slice {
    fn column(&self, name: &str) -> Option<&Value> {
        self.coordinates.get(name)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.coordinates.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}
