//! Values flowing through the engine
//!
//! A single `Value` type is used for slice coordinates, raw table cells and
//! aggregated measure outputs:
//!
//! - `Long` / `Double`: numeric values (the fast primitive representations)
//! - `Text` / `Bool` / `Null`: plain objects
//! - `Carrier`: partial aggregates of non-associative operators (never leaves a step)
//! - `Error`: a sticky per-slice sentinel for unsupported type combinations
//!
//! Values are totally ordered and hashable so that they can key slices and
//! live inside filters, which must be structurally comparable.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A dynamically typed value
#[derive(Debug, Clone)]
pub enum Value {
    /// Explicit absence (e.g. a row missing a grouping column)
    Null,
    /// Boolean
    Bool(bool),
    /// Exact integral number
    Long(i64),
    /// Floating point number
    Double(f64),
    /// Text
    Text(Arc<str>),
    /// Partial aggregate of a non-associative aggregation
    Carrier(Box<Carrier>),
    /// Aggregation type error carried forward for one slice
    Error(Arc<str>),
}

/// Aggregation-specific accumulators
///
/// A carrier is structurally distinct from any raw input, which lets an
/// aggregation tell table values apart from its own partial results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Carrier {
    /// Running sum and count for averages
    Avg { sum: Value, count: i64 },
    /// Distinct values seen so far
    Distinct(BTreeSet<Value>),
    /// Largest values seen so far, sorted descending, at most `n` entries
    TopN { n: usize, values: Vec<Value> },
}

impl Value {
    /// Build a text value
    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Text(Arc::from(s.as_ref()))
    }

    /// Build an error sentinel
    pub fn error(message: impl AsRef<str>) -> Self {
        Value::Error(Arc::from(message.as_ref()))
    }

    /// Check for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check for `Long` or `Double`
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    /// Check for the error sentinel
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Numeric view as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Long(l) => Some(*l as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Exact integral view
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Text view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values across numeric representations.
    ///
    /// Returns `None` when the values are not comparable (e.g. text vs number).
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Equality across numeric representations (`Long(1)` loosely equals `Double(1.0)`)
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.loose_cmp(other) == Some(Ordering::Equal)
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Long(_) | Value::Double(_) => 2,
            Value::Text(_) => 3,
            Value::Carrier(_) => 4,
            Value::Error(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Long(a), Value::Long(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            // Numbers interleave by magnitude; ties put the long first
            (Value::Long(a), Value::Double(b)) => {
                (*a as f64).total_cmp(b).then(Ordering::Less)
            }
            (Value::Double(a), Value::Long(b)) => {
                a.total_cmp(&(*b as f64)).then(Ordering::Greater)
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Carrier(a), Value::Carrier(b)) => a.cmp(b),
            (Value::Error(a), Value::Error(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Long(l) => l.hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Carrier(c) => c.hash(state),
            Value::Error(e) => e.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Long(l) => write!(f, "{}", l),
            Value::Double(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Carrier(c) => write!(f, "{}", c),
            Value::Error(e) => write!(f, "#ERR({})", e),
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Carrier::Avg { sum, count } => write!(f, "avg({}/{})", sum, count),
            Carrier::Distinct(values) => write!(f, "distinct[{}]", values.len()),
            Carrier::TopN { n, values } => write!(f, "top{}[{}]", n, values.len()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Long(l) => serializer.serialize_i64(*l),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Carrier(_) | Value::Error(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Long(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(Arc::from(v))
    }
}
