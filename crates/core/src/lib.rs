//! Core approval logic for Quorum.
//!
//! This crate holds the approval engine with ZERO web or database
//! dependencies. Persistence, identity and notification delivery are reached
//! through traits implemented by the surrounding application.
//!
//! # Modules
//!
//! - `rules` - Declarative conditions and rule evaluation
//! - `workflow` - Workflows, levels and workflow resolution
//! - `approval` - Approval requests, their state machine and the engine
//! - `escalation` - Periodic sweeps of overdue requests
//! - `clock` - Time source

pub mod approval;
pub mod clock;
pub mod escalation;
pub mod rules;
pub mod workflow;

pub use approval::{
    Approvable, ApprovalError, ApprovalEvent, ApprovalRequest, ApprovalService, ApprovalStatus,
    ApprovalStore, ApproverDirectory, DocumentRef, ErrorKind, InMemoryApprovalStore, Notifier,
    Priority, Resolution, StaticDirectory, Submission, TracingNotifier,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use escalation::EscalationScheduler;
pub use rules::{ApprovalRule, Condition, Operator, RuleEvaluator, Value};
pub use workflow::{ApprovalLevel, ApproverBinding, Workflow, WorkflowResolver};
