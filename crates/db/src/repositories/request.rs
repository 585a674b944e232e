//! `ApprovalStore` backed by PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use tracing::debug;

use quorum_core::{
    ApprovalError, ApprovalRequest, ApprovalStatus, ApprovalStore, DocumentRef, Workflow,
};
use quorum_shared::types::{ApprovalRequestId, UserId, WorkflowId};

use super::convert::{db_err, request_from_model, request_to_active};
use super::workflow::WorkflowRepository;
use crate::entities::approval_requests::{self, Column};

/// Approval store over the `approval_requests` table.
///
/// Workflow reads go through the [`WorkflowRepository`] and its cache.
/// `update_request` is a single `UPDATE ... WHERE id = $1 AND version = $2`;
/// a zero row count means another writer committed first.
#[derive(Clone)]
pub struct SeaOrmApprovalStore {
    db: DatabaseConnection,
    workflows: WorkflowRepository,
}

impl SeaOrmApprovalStore {
    /// Creates a store reading workflows through `workflows`.
    #[must_use]
    pub fn new(db: DatabaseConnection, workflows: WorkflowRepository) -> Self {
        Self { db, workflows }
    }

    async fn find_all(
        &self,
        query: sea_orm::Select<approval_requests::Entity>,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        query
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(request_from_model)
            .collect()
    }
}

#[async_trait]
impl ApprovalStore for SeaOrmApprovalStore {
    async fn workflows_for(&self, document_type: &str) -> Result<Vec<Workflow>, ApprovalError> {
        self.workflows.find_by_document_type(document_type).await
    }

    async fn workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, ApprovalError> {
        self.workflows.find_by_id(id).await
    }

    async fn insert_request(&self, request: &ApprovalRequest) -> Result<(), ApprovalError> {
        approval_requests::Entity::insert(request_to_active(request)?)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn request(
        &self,
        id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, ApprovalError> {
        approval_requests::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(request_from_model)
            .transpose()
    }

    async fn update_request(
        &self,
        request: &ApprovalRequest,
        expected_version: i64,
    ) -> Result<bool, ApprovalError> {
        let result = approval_requests::Entity::update_many()
            .set(request_to_active(request)?)
            .filter(Column::Id.eq(request.id.into_inner()))
            .filter(Column::Version.eq(expected_version))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        if result.rows_affected > 0 {
            return Ok(true);
        }

        let exists = approval_requests::Entity::find_by_id(request.id.into_inner())
            .count(&self.db)
            .await
            .map_err(db_err)?
            > 0;
        if !exists {
            return Err(ApprovalError::RequestNotFound(request.id));
        }
        debug!(request_id = %request.id, expected_version, "version check failed");
        Ok(false)
    }

    async fn pending_for(&self, user: UserId) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        self.find_all(
            approval_requests::Entity::find()
                .filter(Column::ApproverId.eq(user.into_inner()))
                .filter(Column::Status.eq(ApprovalStatus::Pending.as_str())),
        )
        .await
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        self.find_all(
            approval_requests::Entity::find()
                .filter(Column::Status.eq(ApprovalStatus::Pending.as_str()))
                .filter(Column::DueDate.lt(now)),
        )
        .await
    }

    async fn pending_with_rule(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        self.find_all(
            approval_requests::Entity::find()
                .filter(Column::Status.eq(ApprovalStatus::Pending.as_str()))
                .filter(Column::RuleId.is_not_null()),
        )
        .await
    }

    async fn by_document(
        &self,
        document: &DocumentRef,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        self.find_all(
            approval_requests::Entity::find()
                .filter(Column::DocumentType.eq(document.document_type.as_str()))
                .filter(Column::DocumentId.eq(document.document_id.into_inner())),
        )
        .await
    }
}
