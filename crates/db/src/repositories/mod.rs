//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the approval engine.

mod convert;
pub mod request;
pub mod workflow;

pub use request::SeaOrmApprovalStore;
pub use workflow::{AddLevelInput, CreateRuleInput, CreateWorkflowInput, WorkflowRepository};
