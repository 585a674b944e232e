//! Approval error types.
//!
//! Every failure the engine surfaces belongs to one [`ErrorKind`]; callers
//! usually branch on the kind rather than the individual variant.

use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

use quorum_shared::AppError;
use quorum_shared::types::{ApprovalRequestId, UserId, WorkflowId};

use crate::approval::types::ApprovalStatus;

/// Coarse classification of an [`ApprovalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or inconsistent workflow configuration.
    Configuration,
    /// Acting user may not perform the transition.
    Authorization,
    /// Request status does not permit the transition.
    InvalidState,
    /// Malformed input.
    Validation,
    /// Referenced entity does not exist.
    NotFound,
    /// Persistence provider failure.
    Store,
}

/// Transition named in an invalid-state error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Approve at the current level.
    Approve,
    /// Reject the request.
    Reject,
    /// Hand the request to another approver.
    Delegate,
    /// Move an overdue request to escalated.
    Escalate,
    /// Resolve an escalated request.
    Resolve,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Delegate => "delegate",
            Self::Escalate => "escalate",
            Self::Resolve => "resolve",
        })
    }
}

/// Errors that can occur during approval operations.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No active workflow governs the document type.
    #[error("No active approval workflow for document type {document_type}")]
    NoWorkflowFound {
        /// The document type.
        document_type: String,
    },

    /// Workflow has no active level to route to.
    #[error("Workflow {0} has no active approval levels")]
    NoActiveLevels(WorkflowId),

    /// No user holds the level's approver role.
    #[error("No user holds approver role {role}")]
    NoApproverForRole {
        /// The unresolved role.
        role: String,
    },

    /// Routing needed a level after `level` but none is configured.
    #[error("Workflow {workflow_id} requires all levels but has no level after {level}")]
    MissingNextLevel {
        /// The workflow.
        workflow_id: WorkflowId,
        /// The level the request sits at.
        level: i32,
    },

    /// A request references a level its workflow does not define.
    #[error("Workflow {workflow_id} has no level {level}")]
    UnknownLevel {
        /// The workflow.
        workflow_id: WorkflowId,
        /// The missing level number.
        level: i32,
    },

    /// Acting user is not the request's bound approver.
    #[error("User {user_id} is not the approver of request {request_id}")]
    NotAuthorized {
        /// The acting user.
        user_id: UserId,
        /// The request.
        request_id: ApprovalRequestId,
    },

    /// The current level forbids delegation.
    #[error("Delegation is not allowed at level {level}")]
    DelegationNotAllowed {
        /// The level number.
        level: i32,
    },

    /// Status does not permit the transition.
    #[error("Cannot {action} request {request_id} in status {status}")]
    InvalidState {
        /// The request.
        request_id: ApprovalRequestId,
        /// Its current status.
        status: ApprovalStatus,
        /// The attempted transition.
        action: Transition,
    },

    /// Another writer changed the request first.
    #[error("Request {0} was modified concurrently")]
    StaleRequest(ApprovalRequestId),

    /// Amounts must not be negative.
    #[error("Amount {0} must not be negative")]
    NegativeAmount(Decimal),

    /// Rejections must carry a comment.
    #[error("Rejection comments are required")]
    RejectionCommentsRequired,

    /// A condition names no field.
    #[error("Condition field must not be empty")]
    EmptyConditionField,

    /// Escalation window outside 1..=168 hours.
    #[error("Escalation hours {0} must be between 1 and 168")]
    InvalidEscalationHours(u32),

    /// Level numbering is not unique and contiguous from 1.
    #[error("Invalid level sequence: {0}")]
    InvalidLevelSequence(String),

    /// Delegating to the current approver.
    #[error("Cannot delegate a request to its current approver")]
    SelfDelegation,

    /// Request id not found.
    #[error("Approval request {0} not found")]
    RequestNotFound(ApprovalRequestId),

    /// Workflow id not found.
    #[error("Workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    /// Persistence failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl ApprovalError {
    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoWorkflowFound { .. }
            | Self::NoActiveLevels(_)
            | Self::NoApproverForRole { .. }
            | Self::MissingNextLevel { .. }
            | Self::UnknownLevel { .. } => ErrorKind::Configuration,

            Self::NotAuthorized { .. } | Self::DelegationNotAllowed { .. } => {
                ErrorKind::Authorization
            }

            Self::InvalidState { .. } | Self::StaleRequest(_) => ErrorKind::InvalidState,

            Self::NegativeAmount(_)
            | Self::RejectionCommentsRequired
            | Self::EmptyConditionField
            | Self::InvalidEscalationHours(_)
            | Self::InvalidLevelSequence(_)
            | Self::SelfDelegation => ErrorKind::Validation,

            Self::RequestNotFound(_) | Self::WorkflowNotFound(_) => ErrorKind::NotFound,

            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Authorization => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidState => 409,
            ErrorKind::Configuration => 422,
            ErrorKind::Store => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoWorkflowFound { .. } => "NO_WORKFLOW_FOUND",
            Self::NoActiveLevels(_) => "NO_ACTIVE_LEVELS",
            Self::NoApproverForRole { .. } => "NO_APPROVER_FOR_ROLE",
            Self::MissingNextLevel { .. } => "MISSING_NEXT_LEVEL",
            Self::UnknownLevel { .. } => "UNKNOWN_LEVEL",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::DelegationNotAllowed { .. } => "DELEGATION_NOT_ALLOWED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::StaleRequest(_) => "STALE_REQUEST",
            Self::NegativeAmount(_) => "NEGATIVE_AMOUNT",
            Self::RejectionCommentsRequired => "REJECTION_COMMENTS_REQUIRED",
            Self::EmptyConditionField => "EMPTY_CONDITION_FIELD",
            Self::InvalidEscalationHours(_) => "INVALID_ESCALATION_HOURS",
            Self::InvalidLevelSequence(_) => "INVALID_LEVEL_SEQUENCE",
            Self::SelfDelegation => "SELF_DELEGATION",
            Self::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            Self::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns true for configuration errors.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

impl From<ApprovalError> for AppError {
    fn from(err: ApprovalError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Configuration => Self::Configuration(message),
            ErrorKind::Authorization => Self::Forbidden(message),
            ErrorKind::InvalidState => Self::InvalidState(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Store => Self::Database(message),
        }
    }
}
