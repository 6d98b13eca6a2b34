//! Multi-type accumulator cell
//!
//! A `MultitypeCell` accumulates the values of one slice under one
//! aggregation. It starts empty; the first ingested value picks a primitive
//! representation (`Long` or `Double`) or falls back to `Object`. Ingesting a
//! value that does not fit the current representation promotes the cell to
//! `Object`, one way only.
//!
//! An `Object` cell keeps separate lanes for the primitive values it has
//! absorbed, and only folds them into the object lane when read, always in the
//! order `object, long, double`. The final value therefore does not depend on
//! the order values were ingested in.

use crate::measure::Aggregation;
use crate::value::Value;

/// Typed callbacks invoked when reading a cell
///
/// Exactly one callback runs per read, matching the representation the cell
/// has reached.
pub trait CellReader {
    /// Result of the read
    type Output;

    /// The cell holds an exact integer
    fn on_long(self, value: i64) -> Self::Output;

    /// The cell holds a floating point number
    fn on_double(self, value: f64) -> Self::Output;

    /// The cell was promoted to the generic representation
    fn on_object(self, value: Value) -> Self::Output;
}

/// Current representation of a cell
#[derive(Debug, Clone, PartialEq)]
enum CellState {
    Empty,
    Long(i64),
    Double(f64),
    Object {
        long: Option<i64>,
        double: Option<f64>,
        object: Option<Value>,
    },
}

/// Per-slice accumulator bound to one aggregation
#[derive(Debug, Clone)]
pub struct MultitypeCell {
    aggregation: Aggregation,
    state: CellState,
}

impl MultitypeCell {
    /// Create an empty cell
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            state: CellState::Empty,
        }
    }

    /// Aggregation the cell is bound to
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Check whether anything was ingested
    pub fn is_empty(&self) -> bool {
        matches!(self.state, CellState::Empty)
    }

    /// Check whether the cell was promoted to the object representation
    pub fn is_object(&self) -> bool {
        matches!(self.state, CellState::Object { .. })
    }

    /// Merge an already-wrapped value into the cell. `Null` is ignored.
    pub fn ingest(&mut self, value: Value) {
        match value {
            Value::Null => {}
            Value::Long(l) => self.ingest_long(l),
            Value::Double(d) => self.ingest_double(d),
            other => self.ingest_object(other),
        }
    }

    /// Merge an exact integer
    pub fn ingest_long(&mut self, value: i64) {
        let agg = self.aggregation;
        if !agg.has_primitive_fast_path() {
            return self.ingest_object(Value::Long(value));
        }

        self.state = match std::mem::replace(&mut self.state, CellState::Empty) {
            CellState::Empty => CellState::Long(value),
            CellState::Long(current) => match agg.merge_longs(current, value) {
                Some(merged) => CellState::Long(merged),
                None => promote(Some(current), None, Some(Value::Long(value)), agg),
            },
            CellState::Double(current) => promote(Some(value), Some(current), None, agg),
            CellState::Object {
                long,
                double,
                object,
            } => match long.map(|current| (current, agg.merge_longs(current, value))) {
                None => CellState::Object {
                    long: Some(value),
                    double,
                    object,
                },
                Some((_, Some(merged))) => CellState::Object {
                    long: Some(merged),
                    double,
                    object,
                },
                // overflow: the accumulated long moves to the object lane
                Some((current, None)) => CellState::Object {
                    long: Some(value),
                    double,
                    object: Some(merge_object(object, Value::Long(current), agg)),
                },
            },
        };
    }

    /// Merge a floating point number
    pub fn ingest_double(&mut self, value: f64) {
        let agg = self.aggregation;
        if !agg.has_primitive_fast_path() {
            return self.ingest_object(Value::Double(value));
        }

        self.state = match std::mem::replace(&mut self.state, CellState::Empty) {
            CellState::Empty => CellState::Double(value),
            CellState::Double(current) => match agg.merge_doubles(current, value) {
                Some(merged) => CellState::Double(merged),
                None => promote(None, Some(current), Some(Value::Double(value)), agg),
            },
            CellState::Long(current) => promote(Some(current), Some(value), None, agg),
            CellState::Object {
                long,
                double,
                object,
            } => {
                let double = match double {
                    Some(current) => agg.merge_doubles(current, value),
                    None => Some(value),
                };
                CellState::Object {
                    long,
                    double,
                    object,
                }
            }
        };
    }

    /// Merge a generic value, promoting the cell if needed
    pub fn ingest_object(&mut self, value: Value) {
        if value.is_null() {
            return;
        }
        let agg = self.aggregation;

        self.state = match std::mem::replace(&mut self.state, CellState::Empty) {
            CellState::Empty => CellState::Object {
                long: None,
                double: None,
                object: Some(value),
            },
            CellState::Long(current) => promote(Some(current), None, Some(value), agg),
            CellState::Double(current) => promote(None, Some(current), Some(value), agg),
            CellState::Object {
                long,
                double,
                object,
            } => CellState::Object {
                long,
                double,
                object: Some(merge_object(object, value, agg)),
            },
        };
    }

    /// Read the cell through exactly one typed callback.
    ///
    /// Returns `None` for an empty cell.
    pub fn read<R: CellReader>(&self, reader: R) -> Option<R::Output> {
        match &self.state {
            CellState::Empty => None,
            CellState::Long(l) => Some(reader.on_long(*l)),
            CellState::Double(d) => Some(reader.on_double(*d)),
            CellState::Object {
                long,
                double,
                object,
            } => {
                let agg = self.aggregation;
                let folded = [
                    object.clone(),
                    long.map(Value::Long),
                    double.map(Value::Double),
                ]
                .into_iter()
                .flatten()
                .fold(Value::Null, |acc, v| agg.merge(acc, v));
                Some(reader.on_object(folded))
            }
        }
    }

    /// Accumulated value, not purged
    pub fn to_value(&self) -> Option<Value> {
        self.read(ValueReader)
    }
}

fn merge_object(object: Option<Value>, value: Value, agg: Aggregation) -> Value {
    match object {
        Some(current) => agg.merge(current, value),
        None => value,
    }
}

fn promote(long: Option<i64>, double: Option<f64>, object: Option<Value>, agg: Aggregation) -> CellState {
    tracing::trace!(aggregation = %agg, "Promoting cell to object representation");
    CellState::Object {
        long,
        double,
        object,
    }
}

/// Reads a cell back into a `Value`
struct ValueReader;

impl CellReader for ValueReader {
    type Output = Value;

    fn on_long(self, value: i64) -> Value {
        Value::Long(value)
    }

    fn on_double(self, value: f64) -> Value {
        Value::Double(value)
    }

    fn on_object(self, value: Value) -> Value {
        value
    }
}
