//! Transition events and their delivery.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use quorum_shared::AppError;
use quorum_shared::types::{ApprovalRequestId, UserId, WorkflowId};

use crate::approval::types::DocumentRef;
use crate::rules::rule::EscalationAction;

/// Event published after a committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ApprovalEvent {
    /// A request was created.
    Submitted {
        /// The request.
        request_id: ApprovalRequestId,
        /// Submitting user.
        requestor_id: UserId,
        /// First approver.
        approver_id: UserId,
        /// Starting level.
        level: i32,
    },
    /// A level approved and the request moved on.
    LevelApproved {
        /// The request.
        request_id: ApprovalRequestId,
        /// Level that approved.
        level: i32,
        /// User who approved; the requestor for self-approved levels.
        approved_by: UserId,
        /// Approver of the new level.
        next_approver_id: UserId,
    },
    /// The final required level approved.
    Completed {
        /// The request.
        request_id: ApprovalRequestId,
        /// Final approver.
        approved_by: UserId,
    },
    /// An escalated request was approved outright.
    Approved {
        /// The request.
        request_id: ApprovalRequestId,
        /// Approving user.
        approved_by: UserId,
    },
    /// The request was rejected.
    Rejected {
        /// The request.
        request_id: ApprovalRequestId,
        /// Rejecting user.
        rejected_by: UserId,
        /// Rejection comment.
        comments: String,
    },
    /// The approver handed the request on.
    Delegated {
        /// The request.
        request_id: ApprovalRequestId,
        /// Previous approver.
        from: UserId,
        /// New approver.
        to: UserId,
    },
    /// The request went overdue and escalated.
    Escalated {
        /// The request.
        request_id: ApprovalRequestId,
        /// Level it was waiting at.
        level: i32,
        /// Recorded reason.
        reason: String,
    },
    /// An escalated request re-entered pending at a later level.
    Routed {
        /// The request.
        request_id: ApprovalRequestId,
        /// New level.
        level: i32,
        /// Approver of the new level.
        approver_id: UserId,
    },
    /// A rule's level-specific escalation window elapsed.
    EscalationAction {
        /// The request.
        request_id: ApprovalRequestId,
        /// Level the override applies to.
        level: i32,
        /// Configured action.
        action: EscalationAction,
    },
    /// A sub-threshold document skipped approval.
    AutoApproved {
        /// The document.
        document: DocumentRef,
        /// Workflow whose threshold was not reached.
        workflow_id: WorkflowId,
        /// Document amount.
        amount: Decimal,
    },
}

impl ApprovalEvent {
    /// Event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::LevelApproved { .. } => "level_approved",
            Self::Completed { .. } => "completed",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
            Self::Delegated { .. } => "delegated",
            Self::Escalated { .. } => "escalated",
            Self::Routed { .. } => "routed",
            Self::EscalationAction { .. } => "escalation_action",
            Self::AutoApproved { .. } => "auto_approved",
        }
    }

    /// The request the event concerns; none for skipped submissions.
    #[must_use]
    pub fn request_id(&self) -> Option<ApprovalRequestId> {
        match self {
            Self::Submitted { request_id, .. }
            | Self::LevelApproved { request_id, .. }
            | Self::Completed { request_id, .. }
            | Self::Approved { request_id, .. }
            | Self::Rejected { request_id, .. }
            | Self::Delegated { request_id, .. }
            | Self::Escalated { request_id, .. }
            | Self::Routed { request_id, .. }
            | Self::EscalationAction { request_id, .. } => Some(*request_id),
            Self::AutoApproved { .. } => None,
        }
    }

    /// JSON payload for delivery.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Delivery failure.
#[derive(Debug, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        Self::ExternalService(err.0)
    }
}

/// Receives transition events for delivery outside the engine.
///
/// Delivery is fire-and-forget: a failure is logged by the caller and never
/// undoes the transition that produced the event.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one event.
    async fn notify(&self, event: &ApprovalEvent) -> Result<(), NotifyError>;
}

/// Notifier that writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &ApprovalEvent) -> Result<(), NotifyError> {
        info!(
            event_type = event.event_type(),
            request_id = ?event.request_id(),
            payload = %event.payload(),
            "approval event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_tagged() {
        let event = ApprovalEvent::EscalationAction {
            request_id: ApprovalRequestId::new(),
            level: 2,
            action: EscalationAction::SendReminder,
        };
        let payload = event.payload();
        assert_eq!(payload["event"], "escalation_action");
        assert_eq!(payload["action"], "send_reminder");
        assert_eq!(payload["level"], 2);
        assert_eq!(event.event_type(), "escalation_action");
    }

    #[test]
    fn test_auto_approved_has_no_request() {
        let event = ApprovalEvent::AutoApproved {
            document: DocumentRef::new("expense", quorum_shared::types::DocumentId::new()),
            workflow_id: WorkflowId::new(),
            amount: Decimal::ONE,
        };
        assert!(event.request_id().is_none());
    }

    #[test]
    fn test_notify_error_is_external() {
        let err = AppError::from(NotifyError("smtp down".to_string()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "EXTERNAL_SERVICE_ERROR");
    }

    #[tokio::test]
    async fn test_tracing_notifier_accepts_events() {
        let event = ApprovalEvent::Completed {
            request_id: ApprovalRequestId::new(),
            approved_by: UserId::new(),
        };
        assert!(TracingNotifier.notify(&event).await.is_ok());
    }
}
