//! Multi-type column
//!
//! One `MultitypeCell` per slice, all bound to the same aggregation.
//! Finishing the column purges carriers, so the resulting `SliceToValue`
//! only holds plain values.

use crate::cell::multitype::MultitypeCell;
use crate::cell::output::SliceToValue;
use crate::measure::Aggregation;
use crate::slice::Slice;
use crate::value::Value;
use std::collections::HashMap;

/// Mutable per-slice accumulation for one step
#[derive(Debug)]
pub struct MultitypeColumn {
    aggregation: Aggregation,
    cells: HashMap<Slice, MultitypeCell>,
}

impl MultitypeColumn {
    /// Create an empty column
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            cells: HashMap::new(),
        }
    }

    /// Merge a raw table (or underlying step) value into a slice
    pub fn merge_raw(&mut self, slice: Slice, raw: Value) {
        if raw.is_null() {
            return;
        }
        let wrapped = self.aggregation.wrap_raw(raw);
        self.merge(slice, wrapped);
    }

    /// Merge an already-wrapped value into a slice
    pub fn merge(&mut self, slice: Slice, value: Value) {
        let aggregation = self.aggregation;
        self.cells
            .entry(slice)
            .or_insert_with(|| MultitypeCell::new(aggregation))
            .ingest(value);
    }

    /// Number of slices seen
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check whether no slice was seen
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Freeze the column into a step output, purging carriers
    pub fn finish(self) -> SliceToValue {
        let aggregation = self.aggregation;
        self.cells
            .into_iter()
            .filter_map(|(slice, cell)| {
                let value = aggregation.purge(cell.to_value()?)?;
                Some((slice, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(color: &str) -> Slice {
        Slice::of([("color", color)])
    }

    #[test]
    fn test_merge_per_slice() {
        let mut column = MultitypeColumn::new(Aggregation::Sum);
        column.merge_raw(slice("red"), Value::Long(1));
        column.merge_raw(slice("blue"), Value::Long(10));
        column.merge_raw(slice("red"), Value::Long(2));
        column.merge_raw(slice("red"), Value::Null);
        assert_eq!(column.len(), 2);

        let output = column.finish();
        assert_eq!(output.get(&slice("red")), Some(&Value::Long(3)));
        assert_eq!(output.get(&slice("blue")), Some(&Value::Long(10)));
    }

    #[test]
    fn test_finish_purges_carriers() {
        let mut column = MultitypeColumn::new(Aggregation::Avg);
        column.merge_raw(Slice::grand_total(), Value::Long(1));
        column.merge_raw(Slice::grand_total(), Value::Long(2));

        let output = column.finish();
        assert_eq!(output.get(&Slice::grand_total()), Some(&Value::Double(1.5)));
        assert!(output
            .iter()
            .all(|(_, v)| !matches!(v, Value::Carrier(_))));
    }

    #[test]
    fn test_count_counts_inputs() {
        let mut column = MultitypeColumn::new(Aggregation::Count);
        for v in [Value::text("a"), Value::Double(1.0), Value::Long(7)] {
            column.merge_raw(Slice::grand_total(), v);
        }
        let output = column.finish();
        assert_eq!(output.get(&Slice::grand_total()), Some(&Value::Long(3)));
    }

    #[test]
    fn test_rank_without_enough_values_is_absent() {
        let mut column = MultitypeColumn::new(Aggregation::Rank(3));
        column.merge_raw(slice("red"), Value::Long(5));
        column.merge_raw(slice("red"), Value::Long(9));
        column.merge_raw(slice("blue"), Value::Long(1));
        column.merge_raw(slice("blue"), Value::Long(2));
        column.merge_raw(slice("blue"), Value::Long(3));

        let output = column.finish();
        assert_eq!(output.get(&slice("red")), None);
        assert_eq!(output.get(&slice("blue")), Some(&Value::Long(1)));
        assert_eq!(output.weight(), 1);
    }
}
