//! Approval request domain types.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quorum_shared::types::{ApprovalRequestId, DocumentId, RuleId, UserId, WorkflowId};

use crate::rules::value::DocumentFields;

/// Status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting on the current level's approver.
    Pending,
    /// Approved outright by resolving an escalation.
    Approved,
    /// Rejected by an approver.
    Rejected,
    /// Overdue and escalated.
    Escalated,
    /// Every required level approved.
    Completed,
}

impl ApprovalStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Escalated => "escalated",
            Self::Completed => "completed",
        }
    }

    /// Parses a status from its string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "escalated" => Some(Self::Escalated),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Completed)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// High priority.
    High,
    /// Urgent.
    Urgent,
}

impl Priority {
    /// Returns the string representation of the priority.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Parses a priority from its string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link to the business document under approval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Kind of document (`expense`, `purchase_order`, ...).
    pub document_type: String,
    /// Document identifier within its type.
    pub document_id: DocumentId,
}

impl DocumentRef {
    /// Creates a document reference.
    pub fn new(document_type: impl Into<String>, document_id: DocumentId) -> Self {
        Self {
            document_type: document_type.into(),
            document_id,
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_type, self.document_id)
    }
}

/// A business document that can be routed for approval.
pub trait Approvable: Send + Sync {
    /// Identity of the document.
    fn document_ref(&self) -> DocumentRef;

    /// Monetary amount under approval.
    fn amount(&self) -> Decimal;

    /// Short human-readable description, kept as the requestor comment.
    fn description(&self) -> Option<String>;

    /// Field values exposed to rule conditions.
    ///
    /// `amount` is always added by the engine.
    fn fields(&self) -> DocumentFields {
        DocumentFields::new()
    }

    /// Priority assigned to new requests.
    fn priority(&self) -> Priority {
        Priority::Medium
    }

    /// Called after submission with the resulting status.
    fn on_approval_status(&self, _status: ApprovalStatus) {}
}

/// In-flight approval instance for one document.
///
/// `version` increments on every committed transition and is the
/// optimistic-concurrency token of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique identifier.
    pub id: ApprovalRequestId,
    /// Governing workflow.
    pub workflow_id: WorkflowId,
    /// Rule that matched at submission, if any.
    pub rule_id: Option<RuleId>,
    /// Document under approval.
    pub document: DocumentRef,
    /// Submitting user.
    pub requestor_id: UserId,
    /// Approver bound to the current level.
    pub approver_id: UserId,
    /// Amount under approval.
    pub amount: Decimal,
    /// Priority.
    pub priority: Priority,
    /// Current level number.
    pub current_level: i32,
    /// Status.
    pub status: ApprovalStatus,
    /// Deadline for the current level.
    pub due_date: DateTime<Utc>,
    /// Set when status is `approved`.
    pub approved_at: Option<DateTime<Utc>>,
    /// Set when status is `rejected`.
    pub rejected_at: Option<DateTime<Utc>>,
    /// Set when status is `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when status is `escalated`.
    pub escalated_at: Option<DateTime<Utc>>,
    /// Last delegation time.
    pub delegated_at: Option<DateTime<Utc>>,
    /// Approver who last delegated.
    pub delegated_by: Option<UserId>,
    /// Requestor's description.
    pub requestor_comments: Option<String>,
    /// Latest approver comment.
    pub approver_comments: Option<String>,
    /// Why the request escalated.
    pub escalation_reason: Option<String>,
    /// Level whose rule escalation action has already been emitted.
    pub escalation_action_level: Option<i32>,
    /// Document fields captured at submission.
    pub fields: DocumentFields,
    /// Optimistic-concurrency version.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Returns true while the request waits on an approver.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Returns true if pending past its due date.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.due_date < now
    }

    /// Returns true for high and urgent requests.
    #[must_use]
    pub fn is_high_priority(&self) -> bool {
        matches!(self.priority, Priority::High | Priority::Urgent)
    }

    /// Whole days past the due date, 0 unless overdue.
    #[must_use]
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if self.is_overdue(now) {
            (now - self.due_date).num_days()
        } else {
            0
        }
    }

    /// Returns true if `user` may approve or reject now.
    #[must_use]
    pub fn can_approve(&self, user: UserId) -> bool {
        self.approver_id == user && self.is_pending()
    }

    /// Returns true if `user` may delegate now.
    #[must_use]
    pub fn can_delegate(&self, user: UserId) -> bool {
        self.can_approve(user)
    }

    /// Checks that the outcome timestamps agree with the status.
    ///
    /// A pending request has none of them; any other status has exactly
    /// its own.
    #[must_use]
    pub fn timestamps_consistent(&self) -> bool {
        let set = [
            (ApprovalStatus::Approved, self.approved_at.is_some()),
            (ApprovalStatus::Rejected, self.rejected_at.is_some()),
            (ApprovalStatus::Completed, self.completed_at.is_some()),
            (ApprovalStatus::Escalated, self.escalated_at.is_some()),
        ];
        set.iter().all(|(status, present)| *present == (self.status == *status))
    }
}
