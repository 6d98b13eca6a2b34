//! Step outputs

use crate::slice::Slice;
use crate::value::Value;
use std::collections::HashMap;

/// Immutable slice → value mapping produced by one step evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceToValue {
    values: HashMap<Slice, Value>,
}

impl SliceToValue {
    /// An output with no slice
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value of a slice
    pub fn get(&self, slice: &Slice) -> Option<&Value> {
        self.values.get(slice)
    }

    /// Check whether a slice has a value
    pub fn contains(&self, slice: &Slice) -> bool {
        self.values.contains_key(slice)
    }

    /// Number of slices
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check for an output without slices
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cache weight: one unit per slice
    pub fn weight(&self) -> usize {
        self.values.len()
    }

    /// Iterate over slices and values
    pub fn iter(&self) -> impl Iterator<Item = (&Slice, &Value)> {
        self.values.iter()
    }

    /// Iterate over slices
    pub fn slices(&self) -> impl Iterator<Item = &Slice> {
        self.values.keys()
    }
}

impl FromIterator<(Slice, Value)> for SliceToValue {
    fn from_iter<I: IntoIterator<Item = (Slice, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SliceToValue {
    type Item = (Slice, Value);
    type IntoIter = std::collections::hash_map::IntoIter<Slice, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
