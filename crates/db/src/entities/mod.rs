//! `SeaORM` entity definitions for the approval tables.

pub mod approval_levels;
pub mod approval_requests;
pub mod approval_rules;
pub mod approval_workflows;
