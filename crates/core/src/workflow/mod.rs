//! Workflow definitions and resolution.
//!
//! # Modules
//!
//! - `types` - Workflows and their ordered approval levels
//! - `resolver` - Workflow selection, level ordering and rule matching

pub mod resolver;
pub mod types;

#[cfg(test)]
mod resolver_props;

pub use resolver::WorkflowResolver;
pub use types::{
    ApprovalLevel, ApproverBinding, DEFAULT_ESCALATION_HOURS, MAX_ESCALATION_HOURS, Workflow,
};
