//! Approval rules: prioritized condition sets attached to a workflow.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use quorum_shared::types::{RuleId, WorkflowId};

use crate::approval::error::ApprovalError;
use crate::rules::condition::{Condition, RuleEvaluator};
use crate::rules::value::DocumentFields;
use crate::workflow::types::MAX_ESCALATION_HOURS;

/// Action taken when a level-specific escalation window elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    /// Tell the approver's supervisor.
    NotifySupervisor,
    /// Move the request on without waiting for the approver.
    AutoEscalate,
    /// Remind the current approver.
    SendReminder,
    /// Raise the request's priority.
    ChangePriority,
    /// Hand the request to another approver.
    Reassign,
}

impl EscalationAction {
    /// Returns the string representation of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotifySupervisor => "notify_supervisor",
            Self::AutoEscalate => "auto_escalate",
            Self::SendReminder => "send_reminder",
            Self::ChangePriority => "change_priority",
            Self::Reassign => "reassign",
        }
    }
}

/// Per-level escalation override: after `hours`, perform `action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStep {
    /// Hours since request creation before the action fires.
    pub hours: u32,
    /// Action to emit.
    pub action: EscalationAction,
}

impl EscalationStep {
    /// Returns true if the step's window has elapsed for a request created at `created_at`.
    ///
    /// A window reaching past the representable range is never due.
    #[must_use]
    pub fn is_due(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at
            .checked_add_signed(Duration::hours(i64::from(self.hours)))
            .is_some_and(|due| due < now)
    }

    /// Validates the step's window.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if (1..=MAX_ESCALATION_HOURS).contains(&self.hours) {
            Ok(())
        } else {
            Err(ApprovalError::InvalidEscalationHours(self.hours))
        }
    }
}

/// A declarative gate attached to a workflow.
///
/// Conditions are ANDed. Among the active rules of a workflow the one with the
/// lowest `priority` value that matches is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    /// Unique identifier for the rule.
    pub id: RuleId,
    /// Workflow the rule belongs to.
    pub workflow_id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// ANDed conditions; empty means always matches.
    pub conditions: Vec<Condition>,
    /// Selection priority (lower = higher priority).
    pub priority: i32,
    /// Whether a match should submit the document without a manual step.
    pub auto_trigger: bool,
    /// Escalation overrides keyed by level number.
    pub escalation_rules: BTreeMap<i32, EscalationStep>,
    /// Inactive rules never match.
    pub is_active: bool,
}

impl ApprovalRule {
    /// Creates an active rule with no conditions and no escalation overrides.
    pub fn new(workflow_id: WorkflowId, name: impl Into<String>, priority: i32) -> Self {
        Self {
            id: RuleId::new(),
            workflow_id,
            name: name.into(),
            conditions: Vec::new(),
            priority,
            auto_trigger: false,
            escalation_rules: BTreeMap::new(),
            is_active: true,
        }
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds an escalation override for `level`.
    #[must_use]
    pub fn with_escalation(mut self, level: i32, step: EscalationStep) -> Self {
        self.escalation_rules.insert(level, step);
        self
    }

    /// Marks the rule as auto-triggering.
    #[must_use]
    pub fn auto_triggered(mut self) -> Self {
        self.auto_trigger = true;
        self
    }

    /// Validates all conditions and escalation steps.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        self.conditions.iter().try_for_each(Condition::validate)?;
        self.escalation_rules
            .values()
            .try_for_each(EscalationStep::validate)
    }

    /// Returns true if the rule is active and its conditions hold for `data`.
    #[must_use]
    pub fn matches(&self, data: &DocumentFields) -> bool {
        self.is_active && RuleEvaluator::evaluate(&self.conditions, data)
    }

    /// Returns the escalation override for a level, if any.
    #[must_use]
    pub fn escalation_for(&self, level: i32) -> Option<&EscalationStep> {
        self.escalation_rules.get(&level)
    }
}
