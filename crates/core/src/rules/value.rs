//! Typed document field values and their coercion rules.
//!
//! Documents hand the rule evaluator a flat map of field values. Comparisons
//! between values follow a fixed coercion table instead of ambient language
//! coercion:
//!
//! - A value is *numeric* if it is a `Number`, or a `String` whose trimmed
//!   contents parse as a decimal. Booleans, nulls and lists are never numeric.
//! - Equality compares numerically when both sides are numeric (`"10" == 10`,
//!   `10 == 10.00`), element-wise for two lists, and by text otherwise
//!   (`true == "true"`). `Null` only equals `Null`.
//! - Ordering compares numerically when both sides are numeric and
//!   lexicographically when both are non-numeric strings. Every other pairing
//!   is unordered, which fails the comparison.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Field values of a submitted document, keyed by field name.
pub type DocumentFields = BTreeMap<String, Value>;

/// A dynamically typed field or condition value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Exact decimal number.
    Number(Decimal),
    /// Free text.
    String(String),
    /// Ordered list of values, used by `in` / `not_in`.
    List(Vec<Value>),
}

impl Value {
    /// Returns the numeric reading of the value, if it has one.
    #[must_use]
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => parse_decimal(s.trim()),
            Self::Null | Self::Bool(_) | Self::List(_) => None,
        }
    }

    /// Returns the textual reading of a scalar value.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::String(s) => Some(Cow::Borrowed(s.as_str())),
            Self::Number(n) => Some(Cow::Owned(n.normalize().to_string())),
            Self::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Self::Null | Self::List(_) => None,
        }
    }

    /// Loose equality under the module's coercion rules.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Self::List(_), _) | (_, Self::List(_)) => false,
            _ => {
                if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
                    return a == b;
                }
                match (self.as_text(), other.as_text()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
        }
    }

    /// Loose ordering under the module's coercion rules.
    ///
    /// Returns `None` when the pair has no defined order.
    #[must_use]
    pub fn loose_cmp(&self, other: &Self) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return Some(a.cmp(&b));
        }
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(b)),
            serde_json::Value::Number(n) => parse_decimal(&n.to_string())
                .map(Self::Number)
                .ok_or_else(|| format!("number {n} is not representable as a decimal")),
            serde_json::Value::String(s) => Ok(Self::String(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Self::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            serde_json::Value::Object(_) => Err("objects are not valid field values".to_string()),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                let text = n.normalize().to_string();
                serde_json::Number::from_str(&text).map_or(Self::String(text), Self::Number)
            }
            Value::String(s) => Self::String(s),
            Value::List(items) => Self::Array(items.into_iter().map(Into::into).collect()),
        }
    }
}
