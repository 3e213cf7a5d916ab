//! Compiles constraint trees into per-row predicates.
//!
//! Each constraint is resolved once against its column's data type into a
//! [`Predicate`]; evaluating a row is then a plain match with no further
//! dispatch on comparator or type.

use crate::constraint::{Comparator, Constraint, ConstraintGroups};
use crate::error::{CoreError, CoreResult};
use crate::schema::ColumnDefinition;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use strata_codec::scalar::{round_to, stringify};
use strata_codec::{DataType, Value};

/// One of the six ordering comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CmpOp {
    fn from_comparator(comparator: Comparator) -> Option<Self> {
        match comparator {
            Comparator::Eq => Some(Self::Eq),
            Comparator::Ne => Some(Self::Ne),
            Comparator::Gt => Some(Self::Gt),
            Comparator::Ge => Some(Self::Ge),
            Comparator::Lt => Some(Self::Lt),
            Comparator::Le => Some(Self::Le),
            _ => None,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

/// A case-insensitive text test. Needles are stored lowercased.
#[derive(Debug, Clone)]
pub enum TextTest {
    /// Ordering comparison against a lowercased target.
    Compare {
        /// Operator.
        op: CmpOp,
        /// Lowercased target.
        target: String,
    },
    /// Set membership.
    Set {
        /// True for `not in`.
        negate: bool,
        /// Lowercased members.
        values: HashSet<String>,
    },
    /// Substring search.
    Contains {
        /// True for `not contains`.
        negate: bool,
        /// Lowercased needle.
        needle: String,
    },
    /// Any of several substrings.
    ContainsAny {
        /// True for `not contains in`.
        negate: bool,
        /// Lowercased needles.
        needles: Vec<String>,
    },
    /// All of several substrings.
    ContainsAll {
        /// Lowercased needles.
        needles: Vec<String>,
    },
    /// Prefix test.
    BeginsWith {
        /// True for `not begins with`.
        negate: bool,
        /// Lowercased prefix.
        prefix: String,
    },
    /// Suffix test.
    EndsWith {
        /// True for `not ends with`.
        negate: bool,
        /// Lowercased suffix.
        suffix: String,
    },
    /// Regular expression, matched against the original-case value.
    Regex {
        /// True for `not regex`.
        negate: bool,
        /// Compiled pattern.
        regex: Regex,
    },
}

impl TextTest {
    fn compile(comparator: Comparator, target: &Value) -> CoreResult<Self> {
        let text = || stringify(target).to_lowercase();
        let list = || -> Vec<String> {
            target_list(target).iter().map(|v| stringify(v).to_lowercase()).collect()
        };
        Ok(match comparator {
            Comparator::In => Self::Set { negate: false, values: list().into_iter().collect() },
            Comparator::NotIn => Self::Set { negate: true, values: list().into_iter().collect() },
            Comparator::Contains => Self::Contains { negate: false, needle: text() },
            Comparator::NotContains => Self::Contains { negate: true, needle: text() },
            Comparator::ContainsIn => Self::ContainsAny { negate: false, needles: list() },
            Comparator::NotContainsIn => Self::ContainsAny { negate: true, needles: list() },
            Comparator::ContainsAll => Self::ContainsAll { needles: list() },
            Comparator::BeginsWith => Self::BeginsWith { negate: false, prefix: text() },
            Comparator::NotBeginsWith => Self::BeginsWith { negate: true, prefix: text() },
            Comparator::EndsWith => Self::EndsWith { negate: false, suffix: text() },
            Comparator::NotEndsWith => Self::EndsWith { negate: true, suffix: text() },
            Comparator::Regex => Self::Regex { negate: false, regex: compile_regex(&stringify(target))? },
            Comparator::NotRegex => Self::Regex { negate: true, regex: compile_regex(&stringify(target))? },
            other => match CmpOp::from_comparator(other) {
                Some(op) => Self::Compare { op, target: text() },
                None => {
                    return Err(CoreError::unsupported(format!(
                        "comparator {other} has no text form"
                    )))
                }
            },
        })
    }

    fn evaluate(&self, raw: &str) -> bool {
        if let Self::Regex { negate, regex } = self {
            return regex.is_match(raw) != *negate;
        }
        let value = raw.to_lowercase();
        match self {
            Self::Compare { op, target } => op.holds(value.as_str().cmp(target.as_str())),
            Self::Set { negate, values } => values.contains(&value) != *negate,
            Self::Contains { negate, needle } => value.contains(needle.as_str()) != *negate,
            Self::ContainsAny { negate, needles } => {
                needles.iter().any(|n| value.contains(n.as_str())) != *negate
            }
            Self::ContainsAll { needles } => needles.iter().all(|n| value.contains(n.as_str())),
            // tested on the whole lowercased value, so a prefix or suffix
            // whose lowercase form changes length (`İ`) still lines up
            Self::BeginsWith { negate, prefix } => value.starts_with(prefix.as_str()) != *negate,
            Self::EndsWith { negate, suffix } => value.ends_with(suffix.as_str()) != *negate,
            Self::Regex { .. } => false,
        }
    }
}

/// A numeric test, falling back to text for non-numeric comparators.
#[derive(Debug, Clone)]
pub enum NumericTest<T> {
    /// Ordering comparison.
    Compare {
        /// Operator.
        op: CmpOp,
        /// Target.
        target: T,
    },
    /// List membership.
    Members {
        /// True for `not in`.
        negate: bool,
        /// Members, in request order.
        values: Vec<T>,
    },
    /// Text semantics over the stringified value.
    Text(TextTest),
}

/// A compiled test for one column.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// String column.
    Text(TextTest),
    /// Datetime column, ordering comparator.
    Timestamp {
        /// Operator.
        op: CmpOp,
        /// Parsed target; `None` if it is not a recognizable date or time.
        target: Option<i64>,
    },
    /// Integer column.
    Int(NumericTest<i64>),
    /// Float column; targets are already rounded to `precision`.
    Float {
        /// The test.
        test: NumericTest<f64>,
        /// Rounding applied to row values before testing.
        precision: Option<u32>,
    },
    /// Boolean column.
    Bool {
        /// True for `!=`.
        negate: bool,
        /// Target.
        target: bool,
    },
}

impl Predicate {
    /// Compiles one constraint against its column definition.
    ///
    /// `empty`/`not_empty` become `=`/`!=` against the column's empty value.
    ///
    /// # Errors
    ///
    /// Fails for comparators the data type does not support, and for
    /// invalid regular expressions.
    pub fn compile(constraint: &Constraint, column: &ColumnDefinition) -> CoreResult<Self> {
        let (comparator, target) = match constraint.comparator() {
            Comparator::Empty => (Comparator::Eq, column.empty_value().clone()),
            Comparator::NotEmpty => (Comparator::Ne, column.empty_value().clone()),
            other => (other, Value::from(constraint.value().clone())),
        };
        let op = CmpOp::from_comparator(comparator);

        Ok(match column.data_type() {
            DataType::String => Self::Text(TextTest::compile(comparator, &target)?),
            DataType::Datetime => match op {
                Some(op) => Self::Timestamp {
                    op,
                    target: parse_timestamp(&stringify(&target)),
                },
                None => Self::Text(TextTest::compile(comparator, &target)?),
            },
            DataType::Int => Self::Int(match (op, comparator) {
                (Some(op), _) => NumericTest::Compare {
                    op,
                    target: target.to_int(),
                },
                (None, Comparator::In | Comparator::NotIn) => NumericTest::Members {
                    negate: comparator == Comparator::NotIn,
                    values: target_list(&target).iter().map(Value::to_int).collect(),
                },
                (None, _) => NumericTest::Text(TextTest::compile(comparator, &target)?),
            }),
            DataType::Float => {
                let precision = column.precision();
                let round = |f: f64| precision.map_or(f, |p| round_to(f, p));
                let test = match (op, comparator) {
                    (Some(op), _) => NumericTest::Compare {
                        op,
                        target: round(target.to_float()),
                    },
                    (None, Comparator::In | Comparator::NotIn) => NumericTest::Members {
                        negate: comparator == Comparator::NotIn,
                        values: target_list(&target)
                            .iter()
                            .map(|v| round(v.to_float()))
                            .collect(),
                    },
                    (None, _) => NumericTest::Text(TextTest::compile(comparator, &target)?),
                };
                Self::Float { test, precision }
            }
            DataType::Bool => match comparator {
                Comparator::Eq | Comparator::Ne => Self::Bool {
                    negate: comparator == Comparator::Ne,
                    target: target.to_bool(),
                },
                other => {
                    return Err(CoreError::UnsupportedComparator {
                        column: column.name().to_string(),
                        comparator: other.as_str().to_string(),
                        data_type: DataType::Bool,
                    })
                }
            },
        })
    }

    /// Tests a decoded cell value.
    #[must_use]
    pub fn evaluate(&self, value: &Value) -> bool {
        match self {
            Self::Text(test) => test.evaluate(&stringify(value)),
            Self::Timestamp { op, target } => {
                let actual = parse_timestamp(&stringify(value));
                match (op, actual, target) {
                    (CmpOp::Eq, a, t) => a == *t,
                    (CmpOp::Ne, a, t) => a != *t,
                    (op, Some(a), Some(t)) => op.holds(a.cmp(t)),
                    _ => false,
                }
            }
            Self::Int(test) => match test {
                NumericTest::Compare { op, target } => op.holds(value.to_int().cmp(target)),
                NumericTest::Members { negate, values } => {
                    values.contains(&value.to_int()) != *negate
                }
                NumericTest::Text(text) => text.evaluate(&stringify(value)),
            },
            Self::Float { test, precision } => {
                let actual = precision.map_or(value.to_float(), |p| round_to(value.to_float(), p));
                match test {
                    NumericTest::Compare { op, target } => actual
                        .partial_cmp(target)
                        .is_some_and(|ordering| op.holds(ordering)),
                    NumericTest::Members { negate, values } => {
                        values.iter().any(|v| *v == actual) != *negate
                    }
                    NumericTest::Text(text) => text.evaluate(&stringify(value)),
                }
            }
            Self::Bool { negate, target } => (value.to_bool() == *target) != *negate,
        }
    }
}

/// A predicate bound to a column position.
#[derive(Debug, Clone)]
struct BoundPredicate {
    column: usize,
    predicate: Predicate,
}

/// A compiled OR-of-AND constraint tree.
#[derive(Debug, Clone, Default)]
pub struct CompiledConstraints {
    groups: Vec<Vec<BoundPredicate>>,
}

impl CompiledConstraints {
    /// Compiles `tree` against `columns`, whose positions are the row
    /// positions the predicates will read.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UnknownColumn`] for a constraint on a column
    /// not in `columns`, or with any [`Predicate::compile`] error.
    pub fn compile(tree: &ConstraintGroups, columns: &[ColumnDefinition]) -> CoreResult<Self> {
        let groups = tree
            .groups()
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|constraint| {
                        let column = columns
                            .iter()
                            .position(|c| c.name() == constraint.name())
                            .ok_or_else(|| CoreError::UnknownColumn {
                                name: constraint.name().to_string(),
                            })?;
                        Ok(BoundPredicate {
                            column,
                            predicate: Predicate::compile(constraint, &columns[column])?,
                        })
                    })
                    .collect::<CoreResult<Vec<_>>>()
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self { groups })
    }

    /// True if there is nothing to filter on.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Tests a row: any group whose predicates all hold.
    #[must_use]
    pub fn matches(&self, row: &[Value]) -> bool {
        self.groups.is_empty()
            || self.groups.iter().any(|group| {
                group
                    .iter()
                    .all(|bound| row.get(bound.column).is_some_and(|v| bound.predicate.evaluate(v)))
            })
    }
}

fn target_list(target: &Value) -> Vec<Value> {
    match target {
        Value::Json(serde_json::Value::Array(items)) => {
            items.iter().cloned().map(Value::from).collect()
        }
        other => vec![other.clone()],
    }
}

/// Parses a date or timestamp to seconds since the epoch.
fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Compiles a bare or `/delimited/flags` pattern.
fn compile_regex(pattern: &str) -> CoreResult<Regex> {
    let (body, flags) = split_delimited(pattern).unwrap_or((pattern, ""));
    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' | 'U' => inline.push(flag),
            other => {
                return Err(CoreError::validation(format!(
                    "unsupported regex flag {other:?} in {pattern:?}"
                )))
            }
        }
    }
    let full = if inline.is_empty() {
        body.to_string()
    } else {
        format!("(?{inline}){body}")
    };
    Regex::new(&full)
        .map_err(|err| CoreError::validation(format!("invalid regex {pattern:?}: {err}")))
}

fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let delimiter = pattern.chars().next().filter(|c| "/#~!@%|".contains(*c))?;
    let rest = &pattern[delimiter.len_utf8()..];
    let end = rest.rfind(delimiter)?;
    let flags = &rest[end + delimiter.len_utf8()..];
    flags
        .chars()
        .all(char::is_alphabetic)
        .then_some((&rest[..end], flags))
}
