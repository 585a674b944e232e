//! Pure state transitions for approval requests.
//!
//! Every function here validates its guards before touching the request, so a
//! failed transition leaves the request unchanged. Directory lookups and
//! persistence happen in [`crate::approval::service`].

use chrono::{DateTime, Utc};
use tracing::info;

use quorum_shared::types::UserId;

use crate::approval::error::{ApprovalError, Transition};
use crate::approval::types::{ApprovalRequest, ApprovalStatus};
use crate::rules::rule::EscalationStep;
use crate::workflow::types::ApprovalLevel;

/// Reason recorded when a request escalates for being overdue.
pub const OVERDUE_REASON: &str = "Auto-escalated due to overdue";

/// Stateless transition functions over [`ApprovalRequest`].
pub struct RequestMachine;

impl RequestMachine {
    /// Checks that `request` is in `expected` status.
    pub fn ensure_status(
        request: &ApprovalRequest,
        expected: ApprovalStatus,
        action: Transition,
    ) -> Result<(), ApprovalError> {
        if request.status == expected {
            Ok(())
        } else {
            Err(ApprovalError::InvalidState {
                request_id: request.id,
                status: request.status,
                action,
            })
        }
    }

    /// Checks that `actor` is the bound approver.
    pub fn ensure_approver(request: &ApprovalRequest, actor: UserId) -> Result<(), ApprovalError> {
        if request.approver_id == actor {
            Ok(())
        } else {
            Err(ApprovalError::NotAuthorized {
                user_id: actor,
                request_id: request.id,
            })
        }
    }

    /// Guard shared by approve, reject and delegate.
    ///
    /// Identity is checked before status, so anyone other than the bound
    /// approver is refused regardless of the request's state.
    pub fn guard_pending(
        request: &ApprovalRequest,
        actor: UserId,
        action: Transition,
    ) -> Result<(), ApprovalError> {
        Self::ensure_approver(request, actor)?;
        Self::ensure_status(request, ApprovalStatus::Pending, action)
    }

    /// Checks that the caller acted on the version it last read.
    ///
    /// A request that has since left the status `action` starts from reports
    /// an invalid state; one still open reports a stale read.
    pub fn ensure_version(
        request: &ApprovalRequest,
        expected_version: i64,
        action: Transition,
    ) -> Result<(), ApprovalError> {
        if request.version == expected_version {
            return Ok(());
        }
        Self::ensure_status(request, Self::source_status(action), action)?;
        Err(ApprovalError::StaleRequest(request.id))
    }

    fn source_status(action: Transition) -> ApprovalStatus {
        match action {
            Transition::Resolve => ApprovalStatus::Escalated,
            Transition::Approve
            | Transition::Reject
            | Transition::Delegate
            | Transition::Escalate => ApprovalStatus::Pending,
        }
    }

    /// Moves the request to `status`, keeping outcome timestamps consistent.
    fn set_status(request: &mut ApprovalRequest, status: ApprovalStatus, now: DateTime<Utc>) {
        request.status = status;
        request.approved_at = None;
        request.rejected_at = None;
        request.completed_at = None;
        request.escalated_at = None;
        match status {
            ApprovalStatus::Pending => {}
            ApprovalStatus::Approved => request.approved_at = Some(now),
            ApprovalStatus::Rejected => request.rejected_at = Some(now),
            ApprovalStatus::Completed => request.completed_at = Some(now),
            ApprovalStatus::Escalated => request.escalated_at = Some(now),
        }
        request.updated_at = now;
    }

    /// Places the request pending at `level` with a fresh due date.
    pub fn enter_level(
        request: &mut ApprovalRequest,
        level: &ApprovalLevel,
        approver: UserId,
        now: DateTime<Utc>,
    ) {
        request.current_level = level.level;
        request.approver_id = approver;
        request.due_date = level.due_date_from(now);
        Self::set_status(request, ApprovalStatus::Pending, now);
    }

    /// Records the approver's comment, keeping the previous one when absent.
    pub fn record_comments(request: &mut ApprovalRequest, comments: Option<String>) {
        if let Some(comments) = comments.filter(|c| !c.trim().is_empty()) {
            request.approver_comments = Some(comments);
        }
    }

    /// Closes the request after its final required approval.
    pub fn complete(request: &mut ApprovalRequest, now: DateTime<Utc>) {
        Self::set_status(request, ApprovalStatus::Completed, now);
        info!(request_id = %request.id, level = request.current_level, "approval request completed");
    }

    /// Rejects a pending request.
    pub fn reject(
        request: &mut ApprovalRequest,
        actor: UserId,
        comments: String,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        Self::guard_pending(request, actor, Transition::Reject)?;
        if comments.trim().is_empty() {
            return Err(ApprovalError::RejectionCommentsRequired);
        }
        request.approver_comments = Some(comments);
        Self::set_status(request, ApprovalStatus::Rejected, now);
        info!(request_id = %request.id, user_id = %actor, "approval request rejected");
        Ok(())
    }

    /// Reassigns a pending request to `delegate` at the same level.
    pub fn delegate(
        request: &mut ApprovalRequest,
        level: &ApprovalLevel,
        actor: UserId,
        delegate: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        Self::guard_pending(request, actor, Transition::Delegate)?;
        if !level.can_delegate {
            return Err(ApprovalError::DelegationNotAllowed { level: level.level });
        }
        if delegate == request.approver_id {
            return Err(ApprovalError::SelfDelegation);
        }
        request.approver_id = delegate;
        request.delegated_at = Some(now);
        request.delegated_by = Some(actor);
        request.updated_at = now;
        info!(
            request_id = %request.id,
            from = %actor,
            to = %delegate,
            "approval request delegated"
        );
        Ok(())
    }

    /// Escalates the request if it is overdue at `now`.
    ///
    /// Returns false, leaving the request untouched, when it is not pending or
    /// not yet due. This makes the transition safe to re-run.
    pub fn escalate_if_overdue(request: &mut ApprovalRequest, now: DateTime<Utc>) -> bool {
        if !request.is_overdue(now) {
            return false;
        }
        request.escalation_reason = Some(OVERDUE_REASON.to_string());
        Self::set_status(request, ApprovalStatus::Escalated, now);
        info!(
            request_id = %request.id,
            level = request.current_level,
            due_date = %request.due_date,
            "approval request escalated"
        );
        true
    }

    /// Records that the rule escalation action for the current level fired.
    ///
    /// Returns false, leaving the request untouched, when the step is not yet
    /// due or its action was already emitted at this level.
    pub fn take_escalation_action(
        request: &mut ApprovalRequest,
        step: &EscalationStep,
        now: DateTime<Utc>,
    ) -> bool {
        if request.escalation_action_level == Some(request.current_level)
            || !step.is_due(request.created_at, now)
        {
            return false;
        }
        request.escalation_action_level = Some(request.current_level);
        request.updated_at = now;
        info!(
            request_id = %request.id,
            level = request.current_level,
            action = step.action.as_str(),
            "escalation action due"
        );
        true
    }

    /// Approves an escalated request outright.
    pub fn approve_escalated(
        request: &mut ApprovalRequest,
        actor: UserId,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        Self::ensure_status(request, ApprovalStatus::Escalated, Transition::Resolve)?;
        Self::ensure_approver(request, actor)?;
        Self::record_comments(request, comments);
        Self::set_status(request, ApprovalStatus::Approved, now);
        info!(request_id = %request.id, user_id = %actor, "escalated request approved");
        Ok(())
    }

    /// Rejects an escalated request.
    pub fn reject_escalated(
        request: &mut ApprovalRequest,
        actor: UserId,
        comments: String,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        Self::ensure_status(request, ApprovalStatus::Escalated, Transition::Resolve)?;
        Self::ensure_approver(request, actor)?;
        if comments.trim().is_empty() {
            return Err(ApprovalError::RejectionCommentsRequired);
        }
        request.approver_comments = Some(comments);
        Self::set_status(request, ApprovalStatus::Rejected, now);
        info!(request_id = %request.id, user_id = %actor, "escalated request rejected");
        Ok(())
    }
}
