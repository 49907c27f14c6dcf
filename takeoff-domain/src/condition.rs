use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use takeoff_types::Scalar;
use takeoff_types::config::{FilterItem, FilterValue};
use takeoff_types::element::numbers_equal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Ge => lhs >= rhs || numbers_equal(lhs, rhs),
            CompareOp::Le => lhs <= rhs || numbers_equal(lhs, rhs),
            CompareOp::Eq => numbers_equal(lhs, rhs),
            CompareOp::Ne => !numbers_equal(lhs, rhs),
        }
    }
}

impl FromStr for CompareOp {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(CompareOp::Gt),
            "<" => Ok(CompareOp::Lt),
            ">=" => Ok(CompareOp::Ge),
            "<=" => Ok(CompareOp::Le),
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            other => Err(ConfigError::UnknownOperator {
                op: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled per-key test. The shape is decided once, when the filter is compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Scalar),
    NotEquals(Scalar),
    OneOf(Vec<Scalar>),
    Compare(CompareOp, f64),
    /// Every comparison must hold (ranges such as `[[">", 2], ["<", 3]]`).
    AllOf(Vec<Condition>),
}

impl Condition {
    /// Compile the right-hand side of a mapping filter entry.
    pub fn compile(key: &str, value: &FilterValue) -> Result<Self, ConfigError> {
        let items = match value {
            FilterValue::Scalar(s) => return Ok(Condition::Equals(s.clone())),
            FilterValue::List(items) => items,
        };

        if let [FilterItem::Scalar(Scalar::String(op)), FilterItem::Scalar(rhs)] = items.as_slice()
            && looks_like_operator(op)
        {
            return compare(key, op, rhs);
        }

        if !items.is_empty() && items.iter().all(|i| matches!(i, FilterItem::Tuple(_))) {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                let FilterItem::Tuple(pair) = item else {
                    continue;
                };
                match pair.as_slice() {
                    [Scalar::String(op), rhs] => parts.push(compare(key, op, rhs)?),
                    _ => {
                        return Err(ConfigError::InvalidCondition {
                            key: key.to_string(),
                            message: "range entries must be [operator, number] pairs".to_string(),
                        });
                    }
                }
            }
            return Ok(Condition::AllOf(parts));
        }

        let mut members = Vec::with_capacity(items.len());
        for item in items {
            match item {
                FilterItem::Scalar(s) => members.push(s.clone()),
                FilterItem::Tuple(_) => {
                    return Err(ConfigError::InvalidCondition {
                        key: key.to_string(),
                        message: "cannot mix nested lists with plain values".to_string(),
                    });
                }
            }
        }
        Ok(Condition::OneOf(members))
    }

    /// Evaluate against a resolved value. A missing value never matches.
    pub fn evaluate(&self, value: Option<&Scalar>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Condition::Equals(expected) => value.loosely_equals(expected),
            Condition::NotEquals(expected) => !value.loosely_equals(expected),
            Condition::OneOf(options) => options.iter().any(|o| value.loosely_equals(o)),
            Condition::Compare(op, rhs) => value.as_number().is_some_and(|lhs| op.apply(lhs, *rhs)),
            Condition::AllOf(parts) => parts.iter().all(|p| p.evaluate(Some(value))),
        }
    }
}

pub(crate) fn compare(key: &str, op: &str, rhs: &Scalar) -> Result<Condition, ConfigError> {
    let op: CompareOp = op.parse()?;
    let rhs = rhs
        .as_number()
        .ok_or_else(|| ConfigError::NonNumericOperand {
            key: key.to_string(),
            op: op.to_string(),
            value: rhs.to_string(),
        })?;
    Ok(Condition::Compare(op, rhs))
}

fn looks_like_operator(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && s.chars().all(|c| matches!(c, '<' | '>' | '=' | '!' | '~'))
}
