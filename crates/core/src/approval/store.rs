//! Persistence seam for workflows and approval requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use quorum_shared::types::{ApprovalRequestId, UserId, WorkflowId};

use crate::approval::error::ApprovalError;
use crate::approval::types::{ApprovalRequest, DocumentRef};
use crate::workflow::types::Workflow;

/// Storage for workflow definitions and approval requests.
///
/// `update_request` is a compare-and-set on `ApprovalRequest::version`: it
/// writes only if the stored version still equals `expected_version` and
/// returns whether it did. Every transition goes through it, so two writers
/// racing on the same request cannot both commit.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Workflows (active or not) for a document type.
    async fn workflows_for(&self, document_type: &str) -> Result<Vec<Workflow>, ApprovalError>;

    /// Loads a workflow with its levels and rules.
    async fn workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, ApprovalError>;

    /// Persists a new request.
    async fn insert_request(&self, request: &ApprovalRequest) -> Result<(), ApprovalError>;

    /// Loads a request.
    async fn request(&self, id: ApprovalRequestId)
    -> Result<Option<ApprovalRequest>, ApprovalError>;

    /// Replaces a request if its stored version equals `expected_version`.
    async fn update_request(
        &self,
        request: &ApprovalRequest,
        expected_version: i64,
    ) -> Result<bool, ApprovalError>;

    /// Pending requests bound to `user`.
    async fn pending_for(&self, user: UserId) -> Result<Vec<ApprovalRequest>, ApprovalError>;

    /// Pending requests whose due date is before `now`.
    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>, ApprovalError>;

    /// Pending requests that matched a rule at submission.
    async fn pending_with_rule(&self) -> Result<Vec<ApprovalRequest>, ApprovalError>;

    /// Every request ever raised for a document, oldest first.
    async fn by_document(
        &self,
        document: &DocumentRef,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError>;
}

/// In-process store backed by concurrent maps.
///
/// Used by tests and by callers embedding the engine without a database.
#[derive(Debug, Default)]
pub struct InMemoryApprovalStore {
    workflows: DashMap<WorkflowId, Workflow>,
    requests: DashMap<ApprovalRequestId, ApprovalRequest>,
}

impl InMemoryApprovalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a workflow after validating it.
    pub fn put_workflow(&self, workflow: Workflow) -> Result<(), ApprovalError> {
        workflow.validate()?;
        self.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    fn collect<F>(&self, keep: F) -> Vec<ApprovalRequest>
    where
        F: Fn(&ApprovalRequest) -> bool,
    {
        let mut found: Vec<ApprovalRequest> = self
            .requests
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|r| (r.created_at, r.id.into_inner()));
        found
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn workflows_for(&self, document_type: &str) -> Result<Vec<Workflow>, ApprovalError> {
        Ok(self
            .workflows
            .iter()
            .filter(|entry| entry.document_type == document_type)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, ApprovalError> {
        Ok(self.workflows.get(&id).map(|entry| entry.value().clone()))
    }

    async fn insert_request(&self, request: &ApprovalRequest) -> Result<(), ApprovalError> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(ApprovalError::Store(format!(
                "request {} already exists",
                request.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(request.clone());
                Ok(())
            }
        }
    }

    async fn request(
        &self,
        id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, ApprovalError> {
        Ok(self.requests.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_request(
        &self,
        request: &ApprovalRequest,
        expected_version: i64,
    ) -> Result<bool, ApprovalError> {
        // The shard write lock is held across the compare and the write.
        let Some(mut stored) = self.requests.get_mut(&request.id) else {
            return Err(ApprovalError::RequestNotFound(request.id));
        };
        if stored.version != expected_version {
            return Ok(false);
        }
        *stored = request.clone();
        Ok(true)
    }

    async fn pending_for(&self, user: UserId) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self.collect(|r| r.is_pending() && r.approver_id == user))
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self.collect(|r| r.is_overdue(now)))
    }

    async fn pending_with_rule(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self.collect(|r| r.is_pending() && r.rule_id.is_some()))
    }

    async fn by_document(
        &self,
        document: &DocumentRef,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self.collect(|r| &r.document == document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::types::{ApprovalStatus, Priority};
    use crate::rules::value::DocumentFields;
    use crate::workflow::types::{ApprovalLevel, ApproverBinding};
    use chrono::Duration;
    use quorum_shared::types::DocumentId;
    use rust_decimal_macros::dec;

    fn request(now: DateTime<Utc>, approver: UserId) -> ApprovalRequest {
        ApprovalRequest {
            id: ApprovalRequestId::new(),
            workflow_id: WorkflowId::new(),
            rule_id: None,
            document: DocumentRef::new("expense", DocumentId::new()),
            requestor_id: UserId::new(),
            approver_id: approver,
            amount: dec!(100),
            priority: Priority::Low,
            current_level: 1,
            status: ApprovalStatus::Pending,
            due_date: now + Duration::hours(24),
            approved_at: None,
            rejected_at: None,
            completed_at: None,
            escalated_at: None,
            delegated_at: None,
            delegated_by: None,
            requestor_comments: None,
            approver_comments: None,
            escalation_reason: None,
            escalation_action_level: None,
            fields: DocumentFields::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_update_is_compare_and_set() {
        let store = InMemoryApprovalStore::new();
        let now = Utc::now();
        let mut req = request(now, UserId::new());
        store.insert_request(&req).await.unwrap();

        req.version = 1;
        req.approver_comments = Some("first".into());
        assert!(store.update_request(&req, 0).await.unwrap());

        let mut stale = req.clone();
        stale.version = 1;
        stale.approver_comments = Some("second".into());
        assert!(!store.update_request(&stale, 0).await.unwrap());

        let stored = store.request(req.id).await.unwrap().unwrap();
        assert_eq!(stored.approver_comments.as_deref(), Some("first"));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_request() {
        let store = InMemoryApprovalStore::new();
        let req = request(Utc::now(), UserId::new());
        let err = store.update_request(&req, 0).await.unwrap_err();
        assert!(matches!(err, ApprovalError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemoryApprovalStore::new();
        let req = request(Utc::now(), UserId::new());
        store.insert_request(&req).await.unwrap();
        assert!(store.insert_request(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_queries() {
        let store = InMemoryApprovalStore::new();
        let now = Utc::now();
        let alice = UserId::new();

        let mine = request(now, alice);
        let mut overdue = request(now - Duration::hours(48), UserId::new());
        overdue.document = mine.document.clone();
        let mut closed = request(now - Duration::hours(48), alice);
        closed.status = ApprovalStatus::Completed;
        closed.completed_at = Some(now);

        for r in [&mine, &overdue, &closed] {
            store.insert_request(r).await.unwrap();
        }

        let pending = store.pending_for(alice).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, mine.id);

        let late = store.overdue(now).await.unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].id, overdue.id);

        assert!(store.pending_with_rule().await.unwrap().is_empty());
        let mut ruled = request(now, alice);
        ruled.rule_id = Some(quorum_shared::types::RuleId::new());
        store.insert_request(&ruled).await.unwrap();
        let with_rule = store.pending_with_rule().await.unwrap();
        assert_eq!(with_rule.len(), 1);
        assert_eq!(with_rule[0].id, ruled.id);

        let history = store.by_document(&mine.document).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, overdue.id);
    }

    #[tokio::test]
    async fn test_put_workflow_validates() {
        let store = InMemoryApprovalStore::new();
        let wf = Workflow::new("Expenses", "expense", dec!(100)).with_level(ApprovalLevel::new(
            2,
            "L2",
            ApproverBinding::Role("x".into()),
        ));
        assert!(store.put_workflow(wf).is_err());

        let wf = Workflow::new("Expenses", "expense", dec!(100));
        let id = wf.id;
        store.put_workflow(wf).unwrap();
        assert!(store.workflow(id).await.unwrap().is_some());
        assert_eq!(store.workflows_for("expense").await.unwrap().len(), 1);
        assert!(store.workflows_for("invoice").await.unwrap().is_empty());
    }
}
