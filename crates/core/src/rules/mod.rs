//! Declarative rule evaluation for approval routing.
//!
//! # Modules
//!
//! - `value` - Typed field values and coercion rules
//! - `condition` - Conditions, operators, and the evaluator
//! - `rule` - Prioritized rules with escalation overrides

pub mod condition;
pub mod rule;
pub mod value;

#[cfg(test)]
mod condition_props;

pub use condition::{Condition, Operator, RuleEvaluator};
pub use rule::{ApprovalRule, EscalationAction, EscalationStep};
pub use value::{DocumentFields, Value};
