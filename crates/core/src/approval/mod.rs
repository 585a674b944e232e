//! Approval requests and the engine that routes them.
//!
//! # Modules
//!
//! - `types` - Requests, statuses and the `Approvable` document seam
//! - `error` - Approval error taxonomy
//! - `machine` - Pure request transitions
//! - `store` - Persistence seam and the in-memory store
//! - `directory` - Approver resolution
//! - `notify` - Transition events and delivery
//! - `service` - The async approval engine

pub mod directory;
pub mod error;
pub mod machine;
pub mod notify;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod machine_props;

pub use directory::{ApproverDirectory, StaticDirectory, resolve_approver};
pub use error::{ApprovalError, ErrorKind, Transition};
pub use machine::{OVERDUE_REASON, RequestMachine};
pub use notify::{ApprovalEvent, Notifier, NotifyError, TracingNotifier};
pub use service::{ApprovalService, Resolution, Submission};
pub use store::{ApprovalStore, InMemoryApprovalStore};
pub use types::{Approvable, ApprovalRequest, ApprovalStatus, DocumentRef, Priority};
