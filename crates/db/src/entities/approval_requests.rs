//! `SeaORM` Entity for approval_requests table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "approval_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub rule_id: Option<Uuid>,
    pub document_type: String,
    pub document_id: Uuid,
    pub requestor_id: Uuid,
    pub approver_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    pub priority: String,
    pub current_level: i32,
    pub status: String,
    pub due_date: DateTimeWithTimeZone,
    pub approved_at: Option<DateTimeWithTimeZone>,
    pub rejected_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub escalated_at: Option<DateTimeWithTimeZone>,
    pub delegated_at: Option<DateTimeWithTimeZone>,
    pub delegated_by: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    pub requestor_comments: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub approver_comments: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub escalation_reason: Option<String>,
    pub escalation_action_level: Option<i32>,
    #[sea_orm(column_type = "JsonBinary")]
    pub fields: Json,
    pub version: i64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::approval_workflows::Entity",
        from = "Column::WorkflowId",
        to = "super::approval_workflows::Column::Id"
    )]
    ApprovalWorkflows,
    #[sea_orm(
        belongs_to = "super::approval_rules::Entity",
        from = "Column::RuleId",
        to = "super::approval_rules::Column::Id"
    )]
    ApprovalRules,
}

impl Related<super::approval_workflows::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalWorkflows.def()
    }
}

impl Related<super::approval_rules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalRules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
