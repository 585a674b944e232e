//! Conversions between database rows and engine types.
//!
//! Row data that does not map back onto a valid engine value (unknown status
//! strings, a level bound to neither a user nor a role, malformed JSON) is
//! reported as [`ApprovalError::Store`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{DbErr, Set};
use uuid::Uuid;

use quorum_core::rules::rule::EscalationStep;
use quorum_core::rules::value::DocumentFields;
use quorum_core::{
    ApprovalError, ApprovalLevel, ApprovalRequest, ApprovalRule, ApprovalStatus, ApproverBinding,
    Condition, DocumentRef, Priority, Workflow,
};
use quorum_shared::types::{
    ApprovalRequestId, DocumentId, LevelId, RuleId, UserId, WorkflowId,
};

use crate::entities::{approval_levels, approval_requests, approval_rules, approval_workflows};

pub(crate) fn db_err(e: DbErr) -> ApprovalError {
    ApprovalError::Store(e.to_string())
}

fn corrupt(table: &str, id: Uuid, detail: impl std::fmt::Display) -> ApprovalError {
    ApprovalError::Store(format!("corrupt {table} row {id}: {detail}"))
}

fn utc(at: DateTime<FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

fn offset(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.into()
}

pub(crate) fn level_from_model(model: approval_levels::Model) -> Result<ApprovalLevel, ApprovalError> {
    let approver = match (model.approver_id, model.approver_role) {
        (Some(user), None) => ApproverBinding::User(UserId::from_uuid(user)),
        (None, Some(role)) => ApproverBinding::Role(role),
        _ => return Err(corrupt("approval_levels", model.id, "ambiguous approver")),
    };
    let escalation_hours = u32::try_from(model.escalation_hours)
        .map_err(|e| corrupt("approval_levels", model.id, e))?;

    Ok(ApprovalLevel {
        id: LevelId::from_uuid(model.id),
        level: model.level,
        name: model.name,
        approver,
        escalation_hours,
        can_delegate: model.can_delegate,
        auto_approve_if_same_user: model.auto_approve_if_same_user,
        is_active: model.is_active,
    })
}

pub(crate) fn level_to_active(
    workflow_id: WorkflowId,
    level: &ApprovalLevel,
    now: DateTime<Utc>,
) -> approval_levels::ActiveModel {
    let (approver_id, approver_role) = match &level.approver {
        ApproverBinding::User(user) => (Some(user.into_inner()), None),
        ApproverBinding::Role(role) => (None, Some(role.clone())),
    };
    approval_levels::ActiveModel {
        id: Set(level.id.into_inner()),
        workflow_id: Set(workflow_id.into_inner()),
        level: Set(level.level),
        name: Set(level.name.clone()),
        approver_id: Set(approver_id),
        approver_role: Set(approver_role),
        escalation_hours: Set(i32::try_from(level.escalation_hours).unwrap_or(i32::MAX)),
        can_delegate: Set(level.can_delegate),
        auto_approve_if_same_user: Set(level.auto_approve_if_same_user),
        is_active: Set(level.is_active),
        created_at: Set(offset(now)),
        updated_at: Set(offset(now)),
    }
}

pub(crate) fn rule_from_model(model: approval_rules::Model) -> Result<ApprovalRule, ApprovalError> {
    let conditions: Vec<Condition> = serde_json::from_value(model.conditions)
        .map_err(|e| corrupt("approval_rules", model.id, e))?;
    let escalation_rules: BTreeMap<i32, EscalationStep> =
        serde_json::from_value(model.escalation_rules)
            .map_err(|e| corrupt("approval_rules", model.id, e))?;

    Ok(ApprovalRule {
        id: RuleId::from_uuid(model.id),
        workflow_id: WorkflowId::from_uuid(model.workflow_id),
        name: model.name,
        conditions,
        priority: model.priority,
        auto_trigger: model.auto_trigger,
        escalation_rules,
        is_active: model.is_active,
    })
}

pub(crate) fn rule_to_active(
    rule: &ApprovalRule,
    now: DateTime<Utc>,
) -> Result<approval_rules::ActiveModel, ApprovalError> {
    let conditions = serde_json::to_value(&rule.conditions)
        .map_err(|e| ApprovalError::Store(e.to_string()))?;
    let escalation_rules = serde_json::to_value(&rule.escalation_rules)
        .map_err(|e| ApprovalError::Store(e.to_string()))?;

    Ok(approval_rules::ActiveModel {
        id: Set(rule.id.into_inner()),
        workflow_id: Set(rule.workflow_id.into_inner()),
        name: Set(rule.name.clone()),
        conditions: Set(conditions),
        priority: Set(rule.priority),
        auto_trigger: Set(rule.auto_trigger),
        escalation_rules: Set(escalation_rules),
        is_active: Set(rule.is_active),
        created_at: Set(offset(now)),
        updated_at: Set(offset(now)),
    })
}

pub(crate) fn workflow_to_active(
    workflow: &Workflow,
    now: DateTime<Utc>,
) -> approval_workflows::ActiveModel {
    approval_workflows::ActiveModel {
        id: Set(workflow.id.into_inner()),
        name: Set(workflow.name.clone()),
        document_type: Set(workflow.document_type.clone()),
        threshold_amount: Set(workflow.threshold_amount),
        auto_escalate: Set(workflow.auto_escalate),
        require_all_levels: Set(workflow.require_all_levels),
        is_active: Set(workflow.is_active),
        created_at: Set(offset(now)),
        updated_at: Set(offset(now)),
    }
}

/// Assembles workflows from their rows; levels sorted by number, rules by priority.
pub(crate) fn assemble_workflows(
    workflows: Vec<approval_workflows::Model>,
    levels: Vec<approval_levels::Model>,
    rules: Vec<approval_rules::Model>,
) -> Result<Vec<Workflow>, ApprovalError> {
    let mut levels_by_workflow: HashMap<Uuid, Vec<ApprovalLevel>> = HashMap::new();
    for model in levels {
        let workflow_id = model.workflow_id;
        levels_by_workflow
            .entry(workflow_id)
            .or_default()
            .push(level_from_model(model)?);
    }
    let mut rules_by_workflow: HashMap<Uuid, Vec<ApprovalRule>> = HashMap::new();
    for model in rules {
        let workflow_id = model.workflow_id;
        rules_by_workflow
            .entry(workflow_id)
            .or_default()
            .push(rule_from_model(model)?);
    }

    Ok(workflows
        .into_iter()
        .map(|model| {
            let mut levels = levels_by_workflow.remove(&model.id).unwrap_or_default();
            levels.sort_by_key(|l| l.level);
            let mut rules = rules_by_workflow.remove(&model.id).unwrap_or_default();
            rules.sort_by_key(|r| (r.priority, r.id.into_inner()));

            Workflow {
                id: WorkflowId::from_uuid(model.id),
                name: model.name,
                document_type: model.document_type,
                threshold_amount: model.threshold_amount,
                auto_escalate: model.auto_escalate,
                require_all_levels: model.require_all_levels,
                is_active: model.is_active,
                levels,
                rules,
            }
        })
        .collect())
}

pub(crate) fn request_from_model(
    model: approval_requests::Model,
) -> Result<ApprovalRequest, ApprovalError> {
    let status = ApprovalStatus::parse(&model.status)
        .ok_or_else(|| corrupt("approval_requests", model.id, "unknown status"))?;
    let priority = Priority::parse(&model.priority)
        .ok_or_else(|| corrupt("approval_requests", model.id, "unknown priority"))?;
    let fields: DocumentFields = serde_json::from_value(model.fields)
        .map_err(|e| corrupt("approval_requests", model.id, e))?;

    Ok(ApprovalRequest {
        id: ApprovalRequestId::from_uuid(model.id),
        workflow_id: WorkflowId::from_uuid(model.workflow_id),
        rule_id: model.rule_id.map(RuleId::from_uuid),
        document: DocumentRef::new(model.document_type, DocumentId::from_uuid(model.document_id)),
        requestor_id: UserId::from_uuid(model.requestor_id),
        approver_id: UserId::from_uuid(model.approver_id),
        amount: model.amount,
        priority,
        current_level: model.current_level,
        status,
        due_date: utc(model.due_date),
        approved_at: model.approved_at.map(utc),
        rejected_at: model.rejected_at.map(utc),
        completed_at: model.completed_at.map(utc),
        escalated_at: model.escalated_at.map(utc),
        delegated_at: model.delegated_at.map(utc),
        delegated_by: model.delegated_by.map(UserId::from_uuid),
        requestor_comments: model.requestor_comments,
        approver_comments: model.approver_comments,
        escalation_reason: model.escalation_reason,
        escalation_action_level: model.escalation_action_level,
        fields,
        version: model.version,
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    })
}

pub(crate) fn request_to_active(
    request: &ApprovalRequest,
) -> Result<approval_requests::ActiveModel, ApprovalError> {
    let fields =
        serde_json::to_value(&request.fields).map_err(|e| ApprovalError::Store(e.to_string()))?;

    Ok(approval_requests::ActiveModel {
        id: Set(request.id.into_inner()),
        workflow_id: Set(request.workflow_id.into_inner()),
        rule_id: Set(request.rule_id.map(RuleId::into_inner)),
        document_type: Set(request.document.document_type.clone()),
        document_id: Set(request.document.document_id.into_inner()),
        requestor_id: Set(request.requestor_id.into_inner()),
        approver_id: Set(request.approver_id.into_inner()),
        amount: Set(request.amount),
        priority: Set(request.priority.as_str().to_string()),
        current_level: Set(request.current_level),
        status: Set(request.status.as_str().to_string()),
        due_date: Set(offset(request.due_date)),
        approved_at: Set(request.approved_at.map(offset)),
        rejected_at: Set(request.rejected_at.map(offset)),
        completed_at: Set(request.completed_at.map(offset)),
        escalated_at: Set(request.escalated_at.map(offset)),
        delegated_at: Set(request.delegated_at.map(offset)),
        delegated_by: Set(request.delegated_by.map(UserId::into_inner)),
        requestor_comments: Set(request.requestor_comments.clone()),
        approver_comments: Set(request.approver_comments.clone()),
        escalation_reason: Set(request.escalation_reason.clone()),
        escalation_action_level: Set(request.escalation_action_level),
        fields: Set(fields),
        version: Set(request.version),
        created_at: Set(offset(request.created_at)),
        updated_at: Set(offset(request.updated_at)),
    })
}
