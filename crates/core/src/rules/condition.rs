//! Declarative conditions and the rule evaluator.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::approval::error::ApprovalError;
use crate::rules::value::{DocumentFields, Value};

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// Field value loosely equals one of the listed values.
    In,
    /// Field value loosely equals none of the listed values.
    NotIn,
    /// Substring (text) or element (list) containment.
    Contains,
    /// Text prefix.
    StartsWith,
    /// Text suffix.
    EndsWith,
    /// Condition value is a regular expression matched against the field.
    Regex,
}

impl Operator {
    /// Parses an operator from its symbol or name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "=" | "==" | "equals" | "eq" => Some(Self::Equals),
            "!=" | "<>" | "not_equals" | "ne" => Some(Self::NotEquals),
            ">" | "greater_than" | "gt" => Some(Self::GreaterThan),
            ">=" | "greater_than_or_equal" | "gte" => Some(Self::GreaterThanOrEqual),
            "<" | "less_than" | "lt" => Some(Self::LessThan),
            "<=" | "less_than_or_equal" | "lte" => Some(Self::LessThanOrEqual),
            "in" => Some(Self::In),
            "not_in" | "not in" => Some(Self::NotIn),
            "contains" => Some(Self::Contains),
            "starts_with" => Some(Self::StartsWith),
            "ends_with" => Some(Self::EndsWith),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }

    /// Returns the canonical symbol or name of the operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown condition operator `{value}`"))
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

/// A single `(field, operator, value)` test against document fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Name of the document field under test.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Right-hand side of the comparison.
    pub value: Value,
}

impl Condition {
    /// Creates a new condition.
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Validates that the condition is well-formed.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if self.field.trim().is_empty() {
            return Err(ApprovalError::EmptyConditionField);
        }
        Ok(())
    }

    /// Returns true if the document satisfies this condition.
    ///
    /// A field absent from `data` fails the condition.
    #[must_use]
    pub fn matches(&self, data: &DocumentFields) -> bool {
        let Some(field_value) = data.get(&self.field) else {
            debug!(field = %self.field, "condition field missing from document");
            return false;
        };
        self.operator.apply(field_value, &self.value)
    }
}

impl Operator {
    fn apply(self, field: &Value, expected: &Value) -> bool {
        match self {
            Self::Equals => field.loose_eq(expected),
            Self::NotEquals => !field.loose_eq(expected),
            Self::GreaterThan => field.loose_cmp(expected) == Some(Ordering::Greater),
            Self::GreaterThanOrEqual => matches!(
                field.loose_cmp(expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::LessThan => field.loose_cmp(expected) == Some(Ordering::Less),
            Self::LessThanOrEqual => matches!(
                field.loose_cmp(expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In => candidates(expected).iter().any(|v| field.loose_eq(v)),
            Self::NotIn => !candidates(expected).iter().any(|v| field.loose_eq(v)),
            Self::Contains => match field {
                Value::List(items) => items.iter().any(|v| v.loose_eq(expected)),
                _ => text_pair(field, expected).is_some_and(|(f, e)| f.contains(e.as_ref())),
            },
            Self::StartsWith => {
                text_pair(field, expected).is_some_and(|(f, e)| f.starts_with(e.as_ref()))
            }
            Self::EndsWith => {
                text_pair(field, expected).is_some_and(|(f, e)| f.ends_with(e.as_ref()))
            }
            Self::Regex => regex_matches(field, expected),
        }
    }
}

/// A scalar right-hand side of `in` / `not_in` acts as a one-element list.
fn candidates(expected: &Value) -> &[Value] {
    match expected {
        Value::List(items) => items,
        other => std::slice::from_ref(other),
    }
}

fn text_pair<'a>(
    field: &'a Value,
    expected: &'a Value,
) -> Option<(std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)> {
    Some((field.as_text()?, expected.as_text()?))
}

fn regex_matches(field: &Value, pattern: &Value) -> bool {
    let (Some(subject), Value::String(pattern)) = (field.as_text(), pattern) else {
        return false;
    };
    match Regex::new(pattern) {
        Ok(re) => re.is_match(&subject),
        Err(err) => {
            debug!(%pattern, error = %err, "invalid regex in condition");
            false
        }
    }
}

/// Stateless evaluator for condition lists.
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Evaluates ANDed conditions against document fields.
    ///
    /// An empty condition list always matches.
    #[must_use]
    pub fn evaluate(conditions: &[Condition], data: &DocumentFields) -> bool {
        conditions.iter().all(|c| c.matches(data))
    }
}
