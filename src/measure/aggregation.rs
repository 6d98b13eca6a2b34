//! Aggregation operators
//!
//! An `Aggregation` reduces many values of one slice into one. Every operator
//! exposes:
//!
//! - `wrap_raw`: lift a raw table value into the operator's accumulation domain
//! - `merge`: the generic (object) binary reduce
//! - `merge_longs` / `merge_doubles`: primitive fast paths, when supported
//! - `purge`: turn an accumulated value back into a plain output value
//!
//! Non-associative operators (AVG, COUNT_DISTINCT, RANK) accumulate into a
//! `Carrier`, which is purged before a step output leaves its vertex.
//!
//! `merge` is commutative for every operator except SUM over text operands,
//! which concatenates in argument order.

use crate::measure::error::MeasureError;
use crate::value::{Carrier, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Aggregation operators available to aggregators and bucketors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Aggregation {
    /// Sum of values; text operands concatenate
    Sum,
    /// Maximum value
    Max,
    /// Minimum value
    Min,
    /// Number of non-null values
    Count,
    /// Average of numeric values
    Avg,
    /// Number of distinct values
    CountDistinct,
    /// The n-th largest value (1-based)
    Rank(usize),
}

impl Aggregation {
    /// Whether the operator has long/long and double/double fast paths
    pub fn has_primitive_fast_path(&self) -> bool {
        matches!(self, Self::Sum | Self::Max | Self::Min | Self::Count)
    }

    /// Lift a raw input into the accumulation domain
    pub fn wrap_raw(&self, raw: Value) -> Value {
        if raw.is_null() || raw.is_error() {
            return raw;
        }
        match self {
            Self::Sum | Self::Max | Self::Min => raw,
            Self::Count => Value::Long(1),
            Self::Avg => match raw {
                Value::Carrier(c) if matches!(*c, Carrier::Avg { .. }) => Value::Carrier(c),
                v if v.is_numeric() => Value::Carrier(Box::new(Carrier::Avg { sum: v, count: 1 })),
                other => Value::error(format!("AVG cannot aggregate '{}'", other)),
            },
            Self::CountDistinct => match raw {
                Value::Carrier(c) if matches!(*c, Carrier::Distinct(_)) => Value::Carrier(c),
                v => Value::Carrier(Box::new(Carrier::Distinct(BTreeSet::from([v])))),
            },
            Self::Rank(n) => match raw {
                Value::Carrier(c) if matches!(*c, Carrier::TopN { .. }) => Value::Carrier(c),
                v => Value::Carrier(Box::new(Carrier::TopN {
                    n: *n,
                    values: vec![v],
                })),
            },
        }
    }

    /// Long fast path; `None` when the operator has none or the result
    /// does not fit in an `i64`
    pub fn merge_longs(&self, left: i64, right: i64) -> Option<i64> {
        match self {
            Self::Sum | Self::Count => left.checked_add(right),
            Self::Max => Some(left.max(right)),
            Self::Min => Some(left.min(right)),
            _ => None,
        }
    }

    /// Double fast path; `None` when the operator has none
    pub fn merge_doubles(&self, left: f64, right: f64) -> Option<f64> {
        match self {
            Self::Sum | Self::Count => Some(left + right),
            Self::Max => Some(if left.total_cmp(&right) == Ordering::Less {
                right
            } else {
                left
            }),
            Self::Min => Some(if left.total_cmp(&right) == Ordering::Greater {
                right
            } else {
                left
            }),
            _ => None,
        }
    }

    /// Generic reduce of two accumulated values.
    ///
    /// `Null` is neutral and errors are sticky.
    pub fn merge(&self, left: Value, right: Value) -> Value {
        match (left, right) {
            (Value::Null, other) | (other, Value::Null) => other,
            (e @ Value::Error(_), _) | (_, e @ Value::Error(_)) => e,
            (left, right) => match self {
                Self::Sum | Self::Count => sum_values(left, right),
                Self::Max => {
                    if left >= right {
                        left
                    } else {
                        right
                    }
                }
                Self::Min => {
                    if left <= right {
                        left
                    } else {
                        right
                    }
                }
                Self::Avg | Self::CountDistinct | Self::Rank(_) => {
                    let left = self.wrap_raw(left);
                    let right = self.wrap_raw(right);
                    match (left, right) {
                        (Value::Carrier(l), Value::Carrier(r)) => merge_carriers(*l, *r),
                        (e @ Value::Error(_), _) | (_, e @ Value::Error(_)) => e,
                        (l, r) => Value::error(format!("{} cannot merge '{}' and '{}'", self, l, r)),
                    }
                }
            },
        }
    }

    /// Turn an accumulated value into a plain output value.
    ///
    /// Returns `None` when the operator yields no value (RANK with too few inputs).
    pub fn purge(&self, value: Value) -> Option<Value> {
        match value {
            Value::Carrier(carrier) => match *carrier {
                Carrier::Avg { sum, count } => {
                    let sum = sum.as_f64()?;
                    Some(Value::Double(sum / count as f64))
                }
                Carrier::Distinct(values) => Some(Value::Long(values.len() as i64)),
                Carrier::TopN { n, values } => values.into_iter().nth(n.saturating_sub(1)),
            },
            Value::Null => None,
            other => Some(other),
        }
    }

    /// Aggregate raw values in one go
    pub fn aggregate<I: IntoIterator<Item = Value>>(&self, values: I) -> Option<Value> {
        let accumulated = values
            .into_iter()
            .map(|v| self.wrap_raw(v))
            .fold(Value::Null, |acc, v| self.merge(acc, v));
        self.purge(accumulated)
    }
}

/// SUM over two values: exact for longs (floating on overflow), floating
/// for mixed numbers,
/// concatenation once a non-numeric operand shows up
fn sum_values(left: Value, right: Value) -> Value {
    match (&left, &right) {
        (Value::Long(a), Value::Long(b)) => match a.checked_add(*b) {
            Some(sum) => Value::Long(sum),
            None => Value::Double(*a as f64 + *b as f64),
        },
        (Value::Carrier(_), _) | (_, Value::Carrier(_)) => {
            Value::error(format!("SUM cannot merge '{}' and '{}'", left, right))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Value::Double(a + b),
            _ => Value::text(format!("{}{}", left, right)),
        },
    }
}

fn merge_carriers(left: Carrier, right: Carrier) -> Value {
    match (left, right) {
        (
            Carrier::Avg { sum: ls, count: lc },
            Carrier::Avg { sum: rs, count: rc },
        ) => Value::Carrier(Box::new(Carrier::Avg {
            sum: sum_values(ls, rs),
            count: lc + rc,
        })),
        (Carrier::Distinct(mut l), Carrier::Distinct(r)) => {
            l.extend(r);
            Value::Carrier(Box::new(Carrier::Distinct(l)))
        }
        (Carrier::TopN { n, values: mut l }, Carrier::TopN { values: r, .. }) => {
            l.extend(r);
            l.sort_by(|a, b| b.cmp(a));
            l.truncate(n);
            Value::Carrier(Box::new(Carrier::TopN { n, values: l }))
        }
        (l, r) => Value::error(format!("incompatible carriers '{}' and '{}'", l, r)),
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => write!(f, "SUM"),
            Self::Max => write!(f, "MAX"),
            Self::Min => write!(f, "MIN"),
            Self::Count => write!(f, "COUNT"),
            Self::Avg => write!(f, "AVG"),
            Self::CountDistinct => write!(f, "COUNT_DISTINCT"),
            Self::Rank(n) => write!(f, "RANK({})", n),
        }
    }
}

impl FromStr for Aggregation {
    type Err = MeasureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "sum" => return Ok(Self::Sum),
            "max" => return Ok(Self::Max),
            "min" => return Ok(Self::Min),
            "count" => return Ok(Self::Count),
            "avg" | "average" => return Ok(Self::Avg),
            "count_distinct" | "countdistinct" => return Ok(Self::CountDistinct),
            _ => {}
        }

        // rank(3) or rank:3
        let rank = lower
            .strip_prefix("rank(")
            .and_then(|r| r.strip_suffix(')'))
            .or_else(|| lower.strip_prefix("rank:"));
        match rank.map(|n| n.trim().parse::<usize>()) {
            Some(Ok(n)) if n > 0 => Ok(Self::Rank(n)),
            _ => Err(MeasureError::UnknownOperator(s.to_string())),
        }
    }
}

impl TryFrom<String> for Aggregation {
    type Error = MeasureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Aggregation> for String {
    fn from(aggregation: Aggregation) -> Self {
        aggregation.to_string()
    }
}
