//! Workflow repository: loading and administering workflow definitions.
//!
//! Levels are never deleted, only deactivated, and new levels are always
//! appended with the next number, so a workflow's level numbers stay `1..=n`.
//! Every write invalidates the shared [`WorkflowCache`].

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use quorum_core::rules::rule::EscalationStep;
use quorum_core::{
    ApprovalError, ApprovalLevel, ApprovalRule, ApproverBinding, Condition, Workflow,
};
use quorum_shared::types::WorkflowId;

use super::convert::{
    assemble_workflows, db_err, level_to_active, rule_to_active, workflow_to_active,
};
use crate::cache::WorkflowCache;
use crate::entities::{approval_levels, approval_rules, approval_workflows};

/// Input for creating a workflow.
#[derive(Debug, Clone)]
pub struct CreateWorkflowInput {
    /// Display name.
    pub name: String,
    /// Document type the workflow governs.
    pub document_type: String,
    /// Amounts strictly below this skip approval.
    pub threshold_amount: Decimal,
    /// Route escalated requests on automatically.
    pub auto_escalate: bool,
    /// Every active level must approve.
    pub require_all_levels: bool,
}

/// Input for appending a level to a workflow.
#[derive(Debug, Clone)]
pub struct AddLevelInput {
    /// Display name.
    pub name: String,
    /// Who approves at this level.
    pub approver: ApproverBinding,
    /// Hours before escalation; defaults to 24.
    pub escalation_hours: Option<u32>,
    /// Whether the approver may delegate.
    pub can_delegate: bool,
    /// Skip the level when the approver is the requestor.
    pub auto_approve_if_same_user: bool,
}

impl AddLevelInput {
    /// Input with default flags for the given approver.
    pub fn new(name: impl Into<String>, approver: ApproverBinding) -> Self {
        Self {
            name: name.into(),
            approver,
            escalation_hours: None,
            can_delegate: true,
            auto_approve_if_same_user: false,
        }
    }
}

/// Input for creating a rule.
#[derive(Debug, Clone, Default)]
pub struct CreateRuleInput {
    /// Display name.
    pub name: String,
    /// ANDed conditions.
    pub conditions: Vec<Condition>,
    /// Selection priority (lower = higher priority).
    pub priority: i32,
    /// Whether a match submits automatically.
    pub auto_trigger: bool,
    /// Per-level escalation overrides.
    pub escalation_rules: BTreeMap<i32, EscalationStep>,
}

/// Repository for workflow definitions.
#[derive(Clone)]
pub struct WorkflowRepository {
    db: DatabaseConnection,
    cache: WorkflowCache,
}

impl WorkflowRepository {
    /// Creates a repository with a fresh cache.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_cache(db, WorkflowCache::new())
    }

    /// Creates a repository sharing `cache`.
    #[must_use]
    pub fn with_cache(db: DatabaseConnection, cache: WorkflowCache) -> Self {
        Self { db, cache }
    }

    /// The cache this repository maintains.
    #[must_use]
    pub fn cache(&self) -> &WorkflowCache {
        &self.cache
    }

    /// Workflows (active or not) for a document type, with levels and rules.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails or a row is corrupt.
    pub async fn find_by_document_type(
        &self,
        document_type: &str,
    ) -> Result<Vec<Workflow>, ApprovalError> {
        if let Some(cached) = self.cache.document_type(document_type).await {
            return Ok(cached.as_ref().clone());
        }

        let workflows = approval_workflows::Entity::find()
            .filter(approval_workflows::Column::DocumentType.eq(document_type))
            .order_by_asc(approval_workflows::Column::ThresholdAmount)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        let loaded = load_children(&self.db, workflows).await?;

        self.cache
            .put_document_type(document_type, loaded.clone())
            .await;
        Ok(loaded)
    }

    /// Loads a workflow with its levels and rules.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails or a row is corrupt.
    pub async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, ApprovalError> {
        if let Some(cached) = self.cache.workflow(id).await {
            return Ok(Some(cached.as_ref().clone()));
        }

        let Some(workflow) = find_workflow(&self.db, id).await? else {
            return Ok(None);
        };
        self.cache.put_workflow(workflow.clone()).await;
        Ok(Some(workflow))
    }

    /// Creates a workflow with no levels or rules.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a negative threshold, or a store error.
    pub async fn create_workflow(
        &self,
        input: CreateWorkflowInput,
    ) -> Result<Workflow, ApprovalError> {
        let mut workflow = Workflow::new(input.name, input.document_type, input.threshold_amount);
        workflow.auto_escalate = input.auto_escalate;
        workflow.require_all_levels = input.require_all_levels;
        workflow.validate()?;

        approval_workflows::Entity::insert(workflow_to_active(&workflow, Utc::now()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        self.cache.invalidate_all();

        info!(
            workflow_id = %workflow.id,
            document_type = %workflow.document_type,
            "workflow created"
        );
        Ok(workflow)
    }

    /// Appends a level numbered one past the workflow's last level.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `WorkflowNotFound` if the workflow does not exist
    /// - a validation error for bad escalation hours or an empty role
    /// - a store error if the insert fails
    pub async fn add_level(
        &self,
        workflow_id: WorkflowId,
        input: AddLevelInput,
    ) -> Result<ApprovalLevel, ApprovalError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let mut workflow = find_workflow(&txn, workflow_id)
            .await?
            .ok_or(ApprovalError::WorkflowNotFound(workflow_id))?;
        let next = workflow.levels.iter().map(|l| l.level).max().unwrap_or(0) + 1;

        let mut level = ApprovalLevel::new(next, input.name, input.approver);
        if let Some(hours) = input.escalation_hours {
            level.escalation_hours = hours;
        }
        level.can_delegate = input.can_delegate;
        level.auto_approve_if_same_user = input.auto_approve_if_same_user;

        workflow.levels.push(level.clone());
        workflow.validate()?;

        approval_levels::Entity::insert(level_to_active(workflow_id, &level, Utc::now()))
            .exec(&txn)
            .await
            .map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;
        self.cache.invalidate_all();

        info!(%workflow_id, level = level.level, "approval level added");
        Ok(level)
    }

    /// Soft-deletes a level; it keeps its number and stays resolvable.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLevel` if the workflow has no such level, or a store error.
    pub async fn deactivate_level(
        &self,
        workflow_id: WorkflowId,
        level: i32,
    ) -> Result<(), ApprovalError> {
        let result = approval_levels::Entity::update_many()
            .col_expr(approval_levels::Column::IsActive, Expr::value(false))
            .filter(approval_levels::Column::WorkflowId.eq(workflow_id.into_inner()))
            .filter(approval_levels::Column::Level.eq(level))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(ApprovalError::UnknownLevel { workflow_id, level });
        }
        self.cache.invalidate_all();

        info!(%workflow_id, level, "approval level deactivated");
        Ok(())
    }

    /// Attaches a rule to a workflow.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowNotFound`, a validation error for an empty condition
    /// field, or a store error.
    pub async fn create_rule(
        &self,
        workflow_id: WorkflowId,
        input: CreateRuleInput,
    ) -> Result<ApprovalRule, ApprovalError> {
        let exists = approval_workflows::Entity::find_by_id(workflow_id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .is_some();
        if !exists {
            return Err(ApprovalError::WorkflowNotFound(workflow_id));
        }

        let mut rule = ApprovalRule::new(workflow_id, input.name, input.priority);
        rule.conditions = input.conditions;
        rule.auto_trigger = input.auto_trigger;
        rule.escalation_rules = input.escalation_rules;
        rule.validate()?;

        approval_rules::Entity::insert(rule_to_active(&rule, Utc::now())?)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        self.cache.invalidate_all();

        info!(%workflow_id, rule_id = %rule.id, "approval rule created");
        Ok(rule)
    }

    /// Deactivates a workflow so it is never selected again.
    ///
    /// Requests already raised under it keep progressing.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowNotFound` or a store error.
    pub async fn deactivate_workflow(&self, workflow_id: WorkflowId) -> Result<(), ApprovalError> {
        let result = approval_workflows::Entity::update_many()
            .col_expr(approval_workflows::Column::IsActive, Expr::value(false))
            .filter(approval_workflows::Column::Id.eq(workflow_id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(ApprovalError::WorkflowNotFound(workflow_id));
        }
        self.cache.invalidate_all();

        info!(%workflow_id, "workflow deactivated");
        Ok(())
    }
}

async fn find_workflow<C: ConnectionTrait>(
    db: &C,
    id: WorkflowId,
) -> Result<Option<Workflow>, ApprovalError> {
    let Some(model) = approval_workflows::Entity::find_by_id(id.into_inner())
        .one(db)
        .await
        .map_err(db_err)?
    else {
        return Ok(None);
    };
    Ok(load_children(db, vec![model]).await?.pop())
}

async fn load_children<C: ConnectionTrait>(
    db: &C,
    workflows: Vec<approval_workflows::Model>,
) -> Result<Vec<Workflow>, ApprovalError> {
    if workflows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = workflows.iter().map(|w| w.id).collect();

    let levels = approval_levels::Entity::find()
        .filter(approval_levels::Column::WorkflowId.is_in(ids.clone()))
        .order_by_asc(approval_levels::Column::Level)
        .all(db)
        .await
        .map_err(db_err)?;
    let rules = approval_rules::Entity::find()
        .filter(approval_rules::Column::WorkflowId.is_in(ids))
        .order_by_asc(approval_rules::Column::Priority)
        .all(db)
        .await
        .map_err(db_err)?;

    assemble_workflows(workflows, levels, rules)
}
