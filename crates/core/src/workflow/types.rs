//! Workflow domain types: approval policies and their ordered levels.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quorum_shared::types::{LevelId, UserId, WorkflowId};

use crate::approval::error::ApprovalError;
use crate::rules::rule::ApprovalRule;

/// Default time-to-act for a level, in hours.
pub const DEFAULT_ESCALATION_HOURS: u32 = 24;

/// Longest allowed time-to-act for a level (one week), in hours.
pub const MAX_ESCALATION_HOURS: u32 = 168;

/// Who acts on a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ApproverBinding {
    /// A specific user.
    User(UserId),
    /// Any holder of the named role, resolved through the approver directory.
    Role(String),
}

/// One ordered step of a workflow.
///
/// Levels are soft-deleted (`is_active = false`) and never removed, so that
/// historical requests can still resolve the level they sat at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    /// Unique identifier for the level.
    pub id: LevelId,
    /// Ordinal position, starting at 1.
    pub level: i32,
    /// Display name.
    pub name: String,
    /// Approver for this step.
    pub approver: ApproverBinding,
    /// Hours the approver has before the request escalates.
    pub escalation_hours: u32,
    /// Whether the approver may hand the request to someone else.
    pub can_delegate: bool,
    /// Skip the level when the resolved approver is the requestor.
    pub auto_approve_if_same_user: bool,
    /// Soft-delete flag.
    pub is_active: bool,
}

impl ApprovalLevel {
    /// Creates an active level with the default escalation window.
    pub fn new(level: i32, name: impl Into<String>, approver: ApproverBinding) -> Self {
        Self {
            id: LevelId::new(),
            level,
            name: name.into(),
            approver,
            escalation_hours: DEFAULT_ESCALATION_HOURS,
            can_delegate: true,
            auto_approve_if_same_user: false,
            is_active: true,
        }
    }

    /// Sets the escalation window.
    #[must_use]
    pub fn with_escalation_hours(mut self, hours: u32) -> Self {
        self.escalation_hours = hours;
        self
    }

    /// Validates the level's attributes.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if !(1..=MAX_ESCALATION_HOURS).contains(&self.escalation_hours) {
            return Err(ApprovalError::InvalidEscalationHours(self.escalation_hours));
        }
        if let ApproverBinding::Role(role) = &self.approver
            && role.trim().is_empty()
        {
            return Err(ApprovalError::InvalidLevelSequence(format!(
                "level {} has an empty approver role",
                self.level
            )));
        }
        Ok(())
    }

    /// Time the approver has to act.
    #[must_use]
    pub fn escalation_window(&self) -> Duration {
        Duration::hours(i64::from(self.escalation_hours))
    }

    /// Due date for a request entering this level at `entered_at`.
    ///
    /// Saturates at the latest representable instant.
    #[must_use]
    pub fn due_date_from(&self, entered_at: DateTime<Utc>) -> DateTime<Utc> {
        entered_at
            .checked_add_signed(self.escalation_window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns true if this level's window has elapsed since `created_at`.
    #[must_use]
    pub fn should_escalate(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at
            .checked_add_signed(self.escalation_window())
            .is_some_and(|due| due < now)
    }
}

/// Named approval policy for a document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier for the workflow.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Document type the workflow governs (e.g. `expense`, `purchase_order`).
    pub document_type: String,
    /// Amounts strictly below this skip approval.
    pub threshold_amount: Decimal,
    /// Route escalated requests on to the next level automatically.
    pub auto_escalate: bool,
    /// Every active level must approve before completion.
    pub require_all_levels: bool,
    /// Inactive workflows are never selected.
    pub is_active: bool,
    /// Levels, including soft-deleted ones.
    pub levels: Vec<ApprovalLevel>,
    /// Rules attached to the workflow.
    pub rules: Vec<ApprovalRule>,
}

impl Workflow {
    /// Creates an active workflow with no levels or rules.
    pub fn new(
        name: impl Into<String>,
        document_type: impl Into<String>,
        threshold_amount: Decimal,
    ) -> Self {
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            document_type: document_type.into(),
            threshold_amount,
            auto_escalate: false,
            require_all_levels: true,
            is_active: true,
            levels: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Appends a level.
    #[must_use]
    pub fn with_level(mut self, level: ApprovalLevel) -> Self {
        self.levels.push(level);
        self
    }

    /// Attaches a rule, binding it to this workflow.
    #[must_use]
    pub fn with_rule(mut self, mut rule: ApprovalRule) -> Self {
        rule.workflow_id = self.id;
        self.rules.push(rule);
        self
    }

    /// Looks up a level by number, including soft-deleted levels.
    #[must_use]
    pub fn level(&self, number: i32) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|l| l.level == number)
    }

    /// Looks up a rule by id.
    #[must_use]
    pub fn rule(&self, id: quorum_shared::types::RuleId) -> Option<&ApprovalRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Validates the workflow and everything it owns.
    ///
    /// Level numbers must be unique and form the sequence `1..=n`.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if self.threshold_amount.is_sign_negative() {
            return Err(ApprovalError::NegativeAmount(self.threshold_amount));
        }

        let numbers: BTreeSet<i32> = self.levels.iter().map(|l| l.level).collect();
        if numbers.len() != self.levels.len() {
            return Err(ApprovalError::InvalidLevelSequence(
                "duplicate level numbers".to_string(),
            ));
        }
        for (expected, actual) in (1..).zip(&numbers) {
            if expected != *actual {
                return Err(ApprovalError::InvalidLevelSequence(format!(
                    "expected level {expected}, found {actual}"
                )));
            }
        }

        self.levels.iter().try_for_each(ApprovalLevel::validate)?;
        self.rules.iter().try_for_each(ApprovalRule::validate)
    }
}
