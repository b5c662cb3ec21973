//! # Comparison Operators
//!
//! The helpers shared by every rule bundle: an observed property value is
//! compared against a metric's target value with one of the configured
//! operators.
//!
//! | Operator | Holds when                                            |
//! |----------|-------------------------------------------------------|
//! | `==`     | values are equal (numbers compare numerically)        |
//! | `!=`     | values differ                                         |
//! | `<` `<=` `>` `>=` | both are numbers, or both are strings, and ordered |
//! | `isIn`   | the target is an array containing the value           |
//! | `allIn`  | the value is an array whose elements are all in the target array |

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::PolicyError;

/// A metric comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `isIn`
    IsIn,
    /// `allIn`
    AllIn,
}

impl Operator {
    /// The configuration spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::IsIn => "isIn",
            Self::AllIn => "allIn",
        }
    }

    /// Compare an observed value against a target value.
    pub fn compare(&self, actual: &Value, target: &Value) -> bool {
        match self {
            Self::Eq => values_equal(actual, target),
            Self::Ne => !values_equal(actual, target),
            Self::Lt => order(actual, target) == Some(Ordering::Less),
            Self::Le => matches!(order(actual, target), Some(Ordering::Less | Ordering::Equal)),
            Self::Gt => order(actual, target) == Some(Ordering::Greater),
            Self::Ge => matches!(
                order(actual, target),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::IsIn => contains(target, actual),
            Self::AllIn => match actual {
                Value::Array(items) => items.iter().all(|item| contains(target, item)),
                _ => false,
            },
        }
    }
}

impl FromStr for Operator {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "isIn" => Ok(Self::IsIn),
            "allIn" => Ok(Self::AllIn),
            other => Err(PolicyError::UnknownOperator {
                operator: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}
