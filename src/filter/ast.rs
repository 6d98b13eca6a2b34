//! Filter tree
//!
//! `Filter` is a tagged union of predicates. Constructors normalize their
//! operands (flattening, dropping neutral elements, sorting, deduplicating)
//! so that logically identical filters built in different orders compare
//! equal, which is what step deduplication and caching key on.

use crate::filter::error::{FilterError, FilterResult};
use crate::filter::parser::parse_filter;
use crate::slice::Columns;
use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A predicate over named columns
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Filter {
    /// Accept everything
    MatchAll,
    /// Reject everything
    MatchNone,
    /// Constraint on a single column
    Column { column: String, matcher: Matcher },
    /// All operands must match
    And(Vec<Filter>),
    /// At least one operand must match
    Or(Vec<Filter>),
    /// The operand must not match
    Not(Box<Filter>),
}

/// Constraint on a single column value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Matcher {
    /// Loosely equal to the value
    Equals(Value),
    /// Loosely equal to one of the values
    In(BTreeSet<Value>),
    /// SQL LIKE pattern over the textual form
    Like(LikePattern),
    /// Ordered comparison against the value
    Compare { op: CompareOp, value: Value },
    /// Column missing or null
    IsNull,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompareOp {
    /// Not equal to
    NotEquals,
    /// Greater than
    Gt,
    /// Greater than or equal to
    Gte,
    /// Less than
    Lt,
    /// Less than or equal to
    Lte,
}

impl CompareOp {
    /// Parse from string
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "!=" | "<>" => Some(Self::NotEquals),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            _ => None,
        }
    }

    /// Symbol used in the filter syntax
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NotEquals => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Apply the operator to `actual.loose_cmp(expected)`
    pub fn test(&self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::NotEquals, ordering) => ordering != Some(Ordering::Equal),
            (_, None) => false,
            (Self::Gt, Some(o)) => o == Ordering::Greater,
            (Self::Gte, Some(o)) => o != Ordering::Less,
            (Self::Lt, Some(o)) => o == Ordering::Less,
            (Self::Lte, Some(o)) => o != Ordering::Greater,
        }
    }
}

/// A compiled SQL LIKE pattern (`%` any run, `_` any single character)
///
/// Identity is the source pattern; the compiled regex is derived data.
#[derive(Debug, Clone)]
pub struct LikePattern {
    pattern: String,
    regex: Regex,
}

impl LikePattern {
    /// Compile a LIKE pattern
    pub fn new(pattern: impl Into<String>) -> FilterResult<Self> {
        let pattern = pattern.into();
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push_str("(?s)^");
        for c in pattern.chars() {
            match c {
                '%' => source.push_str(".*"),
                '_' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| FilterError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern, regex })
    }

    /// Source pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match a string
    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

impl PartialEq for LikePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for LikePattern {}

impl Hash for LikePattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
    }
}

impl PartialOrd for LikePattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LikePattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pattern.cmp(&other.pattern)
    }
}

impl Matcher {
    /// Check a column value (`None` when the column is missing)
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let value = match (self, value) {
            (Matcher::IsNull, v) => return v.map_or(true, Value::is_null),
            // Missing columns only satisfy "not equal"
            (Matcher::Compare { op, .. }, None) => return *op == CompareOp::NotEquals,
            (_, None) => return false,
            (_, Some(v)) => v,
        };

        match self {
            Matcher::Equals(expected) => value.loose_eq(expected),
            Matcher::In(expected) => {
                expected.contains(value) || expected.iter().any(|e| value.loose_eq(e))
            }
            Matcher::Like(pattern) => match value {
                Value::Text(s) => pattern.is_match(s),
                Value::Null => false,
                other => pattern.is_match(&other.to_string()),
            },
            Matcher::Compare { op, value: expected } => op.test(value.loose_cmp(expected)),
            Matcher::IsNull => value.is_null(),
        }
    }
}

impl Filter {
    /// Constraint on one column
    pub fn column(column: impl Into<String>, matcher: Matcher) -> Filter {
        Filter::Column {
            column: column.into(),
            matcher,
        }
    }

    /// `column = value`
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::column(column, Matcher::Equals(value.into()))
    }

    /// `column in (values)`; a single value degrades to `Equals`, none to `MatchNone`
    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut values: BTreeSet<Value> = values.into_iter().map(Into::into).collect();
        match values.len() {
            0 => Filter::MatchNone,
            1 => match values.pop_first() {
                Some(value) => Filter::column(column, Matcher::Equals(value)),
                None => Filter::MatchNone,
            },
            _ => Filter::column(column, Matcher::In(values)),
        }
    }

    /// `column like pattern`
    pub fn like(column: impl Into<String>, pattern: &str) -> FilterResult<Filter> {
        Ok(Filter::column(column, Matcher::Like(LikePattern::new(pattern)?)))
    }

    /// `column op value`
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Filter {
        Filter::column(
            column,
            Matcher::Compare {
                op,
                value: value.into(),
            },
        )
    }

    /// `column is null`
    pub fn is_null(column: impl Into<String>) -> Filter {
        Filter::column(column, Matcher::IsNull)
    }

    /// Conjunction, normalized
    pub fn and<I: IntoIterator<Item = Filter>>(operands: I) -> Filter {
        let mut flat = BTreeSet::new();
        for operand in operands {
            match operand {
                Filter::MatchAll => {}
                Filter::MatchNone => return Filter::MatchNone,
                Filter::And(inner) => flat.extend(inner),
                other => {
                    flat.insert(other);
                }
            }
        }
        match flat.len() {
            0 => Filter::MatchAll,
            1 => flat.pop_first().unwrap_or(Filter::MatchAll),
            _ => Filter::And(flat.into_iter().collect()),
        }
    }

    /// Disjunction, normalized
    pub fn or<I: IntoIterator<Item = Filter>>(operands: I) -> Filter {
        let mut flat = BTreeSet::new();
        for operand in operands {
            match operand {
                Filter::MatchNone => {}
                Filter::MatchAll => return Filter::MatchAll,
                Filter::Or(inner) => flat.extend(inner),
                other => {
                    flat.insert(other);
                }
            }
        }
        match flat.len() {
            0 => Filter::MatchNone,
            1 => flat.pop_first().unwrap_or(Filter::MatchNone),
            _ => Filter::Or(flat.into_iter().collect()),
        }
    }

    /// Negation, normalized
    pub fn not(operand: Filter) -> Filter {
        match operand {
            Filter::MatchAll => Filter::MatchNone,
            Filter::MatchNone => Filter::MatchAll,
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }

    /// Check for `MatchAll`
    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::MatchAll)
    }

    /// Check for `MatchNone`
    pub fn is_match_none(&self) -> bool {
        matches!(self, Filter::MatchNone)
    }

    /// Columns referenced anywhere in the filter
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut columns = BTreeSet::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns<'a>(&'a self, into: &mut BTreeSet<&'a str>) {
        match self {
            Filter::MatchAll | Filter::MatchNone => {}
            Filter::Column { column, .. } => {
                into.insert(column.as_str());
            }
            Filter::And(operands) | Filter::Or(operands) => {
                for operand in operands {
                    operand.collect_columns(into);
                }
            }
            Filter::Not(operand) => operand.collect_columns(into),
        }
    }

    /// Check whether any of the columns is referenced
    pub fn references_any(&self, columns: &BTreeSet<String>) -> bool {
        self.columns().iter().any(|c| columns.contains(*c))
    }

    /// Remove every constraint on the given columns.
    ///
    /// The result is always at least as wide as `self`: stripped column
    /// constraints become `MatchAll`, and a negation over a stripped column
    /// is dropped entirely rather than inverted into `MatchNone`.
    pub fn strip_columns(&self, columns: &BTreeSet<String>) -> Filter {
        match self {
            Filter::Column { column, .. } if columns.contains(column) => Filter::MatchAll,
            Filter::And(operands) => {
                Filter::and(operands.iter().map(|f| f.strip_columns(columns)))
            }
            Filter::Or(operands) => Filter::or(operands.iter().map(|f| f.strip_columns(columns))),
            Filter::Not(operand) if operand.references_any(columns) => Filter::MatchAll,
            other => other.clone(),
        }
    }

    /// Evaluate the filter against a row
    pub fn matches<R: Columns + ?Sized>(&self, row: &R) -> bool {
        match self {
            Filter::MatchAll => true,
            Filter::MatchNone => false,
            Filter::Column { column, matcher } => matcher.matches(row.column(column)),
            Filter::And(operands) => operands.iter().all(|f| f.matches(row)),
            Filter::Or(operands) => operands.iter().any(|f| f.matches(row)),
            Filter::Not(operand) => !operand.matches(row),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::MatchAll
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        // Keep whole doubles distinguishable from longs
        Value::Double(d) if d.is_finite() && d.fract() == 0.0 => write!(f, "{:.1}", d),
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::MatchAll => write!(f, "matchAll"),
            Filter::MatchNone => write!(f, "matchNone"),
            Filter::Column { column, matcher } => match matcher {
                Matcher::Equals(value) => {
                    write!(f, "{} = ", column)?;
                    write_literal(f, value)
                }
                Matcher::In(values) => {
                    write!(f, "{} in (", column)?;
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write_literal(f, value)?;
                    }
                    write!(f, ")")
                }
                Matcher::Like(pattern) => {
                    write!(f, "{} like '{}'", column, pattern.pattern().replace('\'', "''"))
                }
                Matcher::Compare { op, value } => {
                    write!(f, "{} {} ", column, op.symbol())?;
                    write_literal(f, value)
                }
                Matcher::IsNull => write!(f, "{} is null", column),
            },
            Filter::And(operands) => {
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " and ")?;
                    }
                    match operand {
                        Filter::Or(_) => write!(f, "({})", operand)?,
                        _ => write!(f, "{}", operand)?,
                    }
                }
                Ok(())
            }
            Filter::Or(operands) => {
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    match operand {
                        Filter::And(_) => write!(f, "({})", operand)?,
                        _ => write!(f, "{}", operand)?,
                    }
                }
                Ok(())
            }
            Filter::Not(operand) => write!(f, "not ({})", operand),
        }
    }
}

impl TryFrom<String> for Filter {
    type Error = FilterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_filter(&value)
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.to_string()
    }
}
