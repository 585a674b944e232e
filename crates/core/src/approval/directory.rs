//! Approver resolution against an identity provider.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use quorum_shared::types::UserId;

use crate::approval::error::ApprovalError;
use crate::workflow::types::{ApprovalLevel, ApproverBinding};

/// Source of role membership.
#[async_trait]
pub trait ApproverDirectory: Send + Sync {
    /// Users holding `role`, in the provider's preferred order.
    async fn users_with_role(&self, role: &str) -> Result<Vec<UserId>, ApprovalError>;
}

/// Resolves the approver for `level`.
///
/// An explicit user binding wins; a role binding takes the first holder.
///
/// # Errors
/// `NoApproverForRole` when nobody holds the role.
pub async fn resolve_approver(
    directory: &dyn ApproverDirectory,
    level: &ApprovalLevel,
) -> Result<UserId, ApprovalError> {
    match &level.approver {
        ApproverBinding::User(user) => Ok(*user),
        ApproverBinding::Role(role) => directory
            .users_with_role(role)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApprovalError::NoApproverForRole { role: role.clone() }),
    }
}

/// Fixed role table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    roles: HashMap<String, Vec<UserId>>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `user` to `role`.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>, user: UserId) -> Self {
        self.roles.entry(role.into()).or_default().push(user);
        self
    }

    /// Builds a directory from a role → user-id table.
    #[must_use]
    pub fn from_roles(roles: HashMap<String, Vec<Uuid>>) -> Self {
        Self {
            roles: roles
                .into_iter()
                .map(|(role, users)| (role, users.into_iter().map(UserId::from_uuid).collect()))
                .collect(),
        }
    }
}

#[async_trait]
impl ApproverDirectory for StaticDirectory {
    async fn users_with_role(&self, role: &str) -> Result<Vec<UserId>, ApprovalError> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }
}
