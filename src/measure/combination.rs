//! Combination functions
//!
//! A `Combination` merges the values of K underlying measures for one slice.
//! Inputs are positional (one per underlying, `None` when the underlying has
//! no value for the slice) and each function documents its null handling.

use crate::measure::aggregation::Aggregation;
use crate::measure::error::MeasureError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// N-ary combine functions available to combinators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Combination {
    /// Sum of present values; absent when every input is absent
    Sum,
    /// First minus second; a single absent side counts as zero
    Subtract,
    /// Product of present values; absent when every input is absent
    Product,
    /// Ratio of two values:
    /// `(None, Some) = 0.0`, `(Some, None) = NaN`, `x / 0 = ±Infinity`
    Divide,
    /// Largest present value
    Max,
    /// Smallest present value
    Min,
    /// First present value
    Coalesce,
}

impl Combination {
    /// Required number of underlyings, if fixed
    pub fn arity(&self) -> Option<usize> {
        match self {
            Self::Subtract | Self::Divide => Some(2),
            _ => None,
        }
    }

    /// Combine one slice's underlying values
    pub fn combine(&self, inputs: &[Option<&Value>]) -> Option<Value> {
        let present = || {
            inputs
                .iter()
                .flatten()
                .filter(|v| !v.is_null())
                .map(|v| (*v).clone())
        };

        match self {
            Self::Sum => Aggregation::Sum.aggregate(present()),
            Self::Max => Aggregation::Max.aggregate(present()),
            Self::Min => Aggregation::Min.aggregate(present()),
            Self::Coalesce => present().next(),
            Self::Product => present().reduce(multiply),
            Self::Subtract => match (input_at(inputs, 0), input_at(inputs, 1)) {
                (None, None) => None,
                (left, right) => Some(subtract(
                    left.cloned().unwrap_or(Value::Long(0)),
                    right.cloned().unwrap_or(Value::Long(0)),
                )),
            },
            Self::Divide => match (input_at(inputs, 0), input_at(inputs, 1)) {
                (None, None) => None,
                (None, Some(_)) => Some(Value::Double(0.0)),
                (Some(_), None) => Some(Value::Double(f64::NAN)),
                (Some(numerator), Some(denominator)) => {
                    match (numerator.as_f64(), denominator.as_f64()) {
                        (Some(n), Some(d)) => Some(Value::Double(n / d)),
                        _ => Some(Value::error(format!(
                            "DIVIDE cannot combine '{}' and '{}'",
                            numerator, denominator
                        ))),
                    }
                }
            },
        }
    }
}

fn input_at<'a>(inputs: &[Option<&'a Value>], index: usize) -> Option<&'a Value> {
    inputs.get(index).copied().flatten().filter(|v| !v.is_null())
}

fn multiply(left: Value, right: Value) -> Value {
    match (&left, &right) {
        (Value::Long(a), Value::Long(b)) => match a.checked_mul(*b) {
            Some(product) => Value::Long(product),
            None => Value::Double(*a as f64 * *b as f64),
        },
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Value::Double(a * b),
            _ => Value::error(format!("PRODUCT cannot combine '{}' and '{}'", left, right)),
        },
    }
}

fn subtract(left: Value, right: Value) -> Value {
    match (&left, &right) {
        (Value::Long(a), Value::Long(b)) => match a.checked_sub(*b) {
            Some(difference) => Value::Long(difference),
            None => Value::Double(*a as f64 - *b as f64),
        },
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Value::Double(a - b),
            _ => Value::error(format!("SUBTRACT cannot combine '{}' and '{}'", left, right)),
        },
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => write!(f, "SUM"),
            Self::Subtract => write!(f, "SUBTRACT"),
            Self::Product => write!(f, "PRODUCT"),
            Self::Divide => write!(f, "DIVIDE"),
            Self::Max => write!(f, "MAX"),
            Self::Min => write!(f, "MIN"),
            Self::Coalesce => write!(f, "COALESCE"),
        }
    }
}

impl FromStr for Combination {
    type Err = MeasureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "subtract" | "minus" => Ok(Self::Subtract),
            "product" | "multiply" => Ok(Self::Product),
            "divide" | "ratio" => Ok(Self::Divide),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            "coalesce" => Ok(Self::Coalesce),
            _ => Err(MeasureError::UnknownOperator(s.to_string())),
        }
    }
}

impl TryFrom<String> for Combination {
    type Error = MeasureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Combination> for String {
    fn from(combination: Combination) -> Self {
        combination.to_string()
    }
}
