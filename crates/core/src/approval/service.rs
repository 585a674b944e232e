//! Approval engine over the store, directory, notifier and clock seams.
//!
//! Each mutating call names the request version the caller last read. The
//! engine loads the request, refuses a stale read, applies a pure transition
//! from [`RequestMachine`] to a local copy and commits it with a
//! compare-and-set on the version. Events are published only after the commit
//! succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use quorum_shared::types::{ApprovalRequestId, DocumentId, UserId, WorkflowId};

use crate::approval::directory::{ApproverDirectory, resolve_approver};
use crate::approval::error::{ApprovalError, ErrorKind, Transition};
use crate::approval::machine::{OVERDUE_REASON, RequestMachine};
use crate::approval::notify::{ApprovalEvent, Notifier};
use crate::approval::store::ApprovalStore;
use crate::approval::types::{Approvable, ApprovalRequest, ApprovalStatus, DocumentRef};
use crate::clock::{Clock, SystemClock};
use crate::rules::rule::EscalationStep;
use crate::rules::value::{DocumentFields, Value};
use crate::workflow::resolver::WorkflowResolver;
use crate::workflow::types::Workflow;

/// Outcome of submitting a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A request was created (possibly already completed by self-approval).
    Created(ApprovalRequest),
    /// The amount is below the workflow threshold; no request exists.
    AutoApproved {
        /// Workflow whose threshold was not reached.
        workflow_id: WorkflowId,
    },
}

impl Submission {
    /// The created request, if any.
    #[must_use]
    pub fn request(&self) -> Option<&ApprovalRequest> {
        match self {
            Self::Created(request) => Some(request),
            Self::AutoApproved { .. } => None,
        }
    }
}

/// How the bound approver settles an escalated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Approve outright.
    Approve {
        /// Optional comment.
        comments: Option<String>,
    },
    /// Reject.
    Reject {
        /// Required comment.
        comments: String,
    },
    /// Send the request on to the next active level.
    Advance,
}

/// The approval engine.
pub struct ApprovalService {
    store: Arc<dyn ApprovalStore>,
    directory: Arc<dyn ApproverDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl ApprovalService {
    /// Creates a service on the system clock.
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        directory: Arc<dyn ApproverDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_clock(store, directory, notifier, Arc::new(SystemClock))
    }

    /// Creates a service on an explicit clock.
    pub fn with_clock(
        store: Arc<dyn ApprovalStore>,
        directory: Arc<dyn ApproverDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            clock,
        }
    }

    /// Submits a document for approval.
    ///
    /// Amounts below the selected workflow's threshold skip approval and
    /// create no request. Otherwise the request starts pending at the first
    /// active level, after any levels the requestor may approve themselves.
    ///
    /// # Errors
    /// - `NegativeAmount` for amounts below zero
    /// - `NoWorkflowFound`, `NoActiveLevels`, `NoApproverForRole` for
    ///   configuration gaps
    pub async fn submit_for_approval(
        &self,
        document: &dyn Approvable,
        requestor: UserId,
    ) -> Result<Submission, ApprovalError> {
        let amount = document.amount();
        if amount < Decimal::ZERO {
            return Err(ApprovalError::NegativeAmount(amount));
        }

        let doc = document.document_ref();
        let workflow = self.select_workflow(&doc.document_type, amount).await?;

        if WorkflowResolver::can_auto_approve(&workflow, amount) {
            info!(document = %doc, %amount, workflow_id = %workflow.id, "below approval threshold");
            self.publish(vec![ApprovalEvent::AutoApproved {
                document: doc,
                workflow_id: workflow.id,
                amount,
            }])
            .await;
            document.on_approval_status(ApprovalStatus::Approved);
            return Ok(Submission::AutoApproved {
                workflow_id: workflow.id,
            });
        }

        let fields = Self::rule_fields(document, amount);
        let rule_id = WorkflowResolver::matching_rule(&workflow, &fields).map(|r| r.id);
        let first = WorkflowResolver::first_level(&workflow)
            .ok_or(ApprovalError::NoActiveLevels(workflow.id))?;
        let approver = resolve_approver(self.directory.as_ref(), first).await?;

        let now = self.clock.now();
        let mut request = ApprovalRequest {
            id: ApprovalRequestId::new(),
            workflow_id: workflow.id,
            rule_id,
            document: doc,
            requestor_id: requestor,
            approver_id: approver,
            amount,
            priority: document.priority(),
            current_level: first.level,
            status: ApprovalStatus::Pending,
            due_date: first.due_date_from(now),
            approved_at: None,
            rejected_at: None,
            completed_at: None,
            escalated_at: None,
            delegated_at: None,
            delegated_by: None,
            requestor_comments: document.description(),
            approver_comments: None,
            escalation_reason: None,
            escalation_action_level: None,
            fields,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut events = vec![ApprovalEvent::Submitted {
            request_id: request.id,
            requestor_id: requestor,
            approver_id: approver,
            level: first.level,
        }];
        self.settle_self_approvals(&workflow, &mut request, now, &mut events)
            .await?;

        self.store.insert_request(&request).await?;
        info!(
            request_id = %request.id,
            document = %request.document,
            workflow_id = %workflow.id,
            status = %request.status,
            level = request.current_level,
            "approval request submitted"
        );
        self.publish(events).await;
        document.on_approval_status(request.status);

        Ok(Submission::Created(request))
    }

    /// Returns true if the document's matching rule asks for automatic submission.
    pub async fn should_auto_trigger(
        &self,
        document: &dyn Approvable,
    ) -> Result<bool, ApprovalError> {
        let amount = document.amount();
        let doc = document.document_ref();
        let workflow = self.select_workflow(&doc.document_type, amount).await?;
        let fields = Self::rule_fields(document, amount);
        Ok(WorkflowResolver::should_auto_trigger(&workflow, &fields))
    }

    /// Approves the request at its current level.
    ///
    /// Advances to the next active level when the workflow requires every
    /// level, otherwise completes the request.
    ///
    /// # Errors
    /// - `StaleRequest` when the request moved past `expected_version` but is
    ///   still pending
    /// - `NotAuthorized` unless `actor` is the bound approver
    /// - `InvalidState` unless pending
    pub async fn approve(
        &self,
        id: ApprovalRequestId,
        expected_version: i64,
        actor: UserId,
        comments: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let now = self.clock.now();
        let mut request = self.load(id).await?;
        RequestMachine::ensure_version(&request, expected_version, Transition::Approve)?;
        let expected = request.version;
        RequestMachine::guard_pending(&request, actor, Transition::Approve)?;

        let workflow = self.load_workflow(request.workflow_id).await?;
        RequestMachine::record_comments(&mut request, comments);

        let mut events = Vec::new();
        self.advance(&workflow, &mut request, actor, now, &mut events)
            .await?;
        self.settle_self_approvals(&workflow, &mut request, now, &mut events)
            .await?;

        self.commit(&mut request, expected, Transition::Approve, now, events)
            .await?;
        Ok(request)
    }

    /// Rejects the request.
    ///
    /// # Errors
    /// - `StaleRequest` when the request moved past `expected_version`
    /// - `NotAuthorized` unless `actor` is the bound approver
    /// - `InvalidState` unless pending
    /// - `RejectionCommentsRequired` for a blank comment
    pub async fn reject(
        &self,
        id: ApprovalRequestId,
        expected_version: i64,
        actor: UserId,
        comments: String,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let now = self.clock.now();
        let mut request = self.load(id).await?;
        RequestMachine::ensure_version(&request, expected_version, Transition::Reject)?;
        let expected = request.version;

        RequestMachine::reject(&mut request, actor, comments.clone(), now)?;
        let events = vec![ApprovalEvent::Rejected {
            request_id: request.id,
            rejected_by: actor,
            comments,
        }];

        self.commit(&mut request, expected, Transition::Reject, now, events)
            .await?;
        Ok(request)
    }

    /// Hands the request to `delegate` without changing its level or status.
    ///
    /// # Errors
    /// - `StaleRequest` when the request moved past `expected_version`
    /// - `NotAuthorized` unless `actor` is the bound approver
    /// - `InvalidState` unless pending
    /// - `DelegationNotAllowed` when the level forbids it
    /// - `SelfDelegation` when `delegate` is already the approver
    pub async fn delegate(
        &self,
        id: ApprovalRequestId,
        expected_version: i64,
        actor: UserId,
        delegate: UserId,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let now = self.clock.now();
        let mut request = self.load(id).await?;
        RequestMachine::ensure_version(&request, expected_version, Transition::Delegate)?;
        let expected = request.version;
        RequestMachine::guard_pending(&request, actor, Transition::Delegate)?;

        let workflow = self.load_workflow(request.workflow_id).await?;
        let level = workflow
            .level(request.current_level)
            .ok_or(ApprovalError::UnknownLevel {
                workflow_id: workflow.id,
                level: request.current_level,
            })?;

        RequestMachine::delegate(&mut request, level, actor, delegate, now)?;
        let events = vec![ApprovalEvent::Delegated {
            request_id: request.id,
            from: actor,
            to: delegate,
        }];

        self.commit(&mut request, expected, Transition::Delegate, now, events)
            .await?;
        Ok(request)
    }

    /// Settles an escalated request on behalf of its bound approver.
    ///
    /// # Errors
    /// - `StaleRequest` when the request moved past `expected_version`
    /// - `InvalidState` unless escalated
    /// - `NotAuthorized` unless `actor` is the bound approver
    /// - `MissingNextLevel` when advancing past the last level of a workflow
    ///   that requires every level
    pub async fn resolve_escalation(
        &self,
        id: ApprovalRequestId,
        expected_version: i64,
        actor: UserId,
        resolution: Resolution,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let now = self.clock.now();
        let mut request = self.load(id).await?;
        RequestMachine::ensure_version(&request, expected_version, Transition::Resolve)?;
        let expected = request.version;
        let mut events = Vec::new();

        match resolution {
            Resolution::Approve { comments } => {
                RequestMachine::approve_escalated(&mut request, actor, comments, now)?;
                events.push(ApprovalEvent::Approved {
                    request_id: request.id,
                    approved_by: actor,
                });
            }
            Resolution::Reject { comments } => {
                RequestMachine::reject_escalated(&mut request, actor, comments.clone(), now)?;
                events.push(ApprovalEvent::Rejected {
                    request_id: request.id,
                    rejected_by: actor,
                    comments,
                });
            }
            Resolution::Advance => {
                RequestMachine::ensure_status(
                    &request,
                    ApprovalStatus::Escalated,
                    Transition::Resolve,
                )?;
                RequestMachine::ensure_approver(&request, actor)?;
                let workflow = self.load_workflow(request.workflow_id).await?;
                if !self
                    .route_escalated(&workflow, &mut request, now, &mut events)
                    .await?
                {
                    if workflow.require_all_levels {
                        return Err(ApprovalError::MissingNextLevel {
                            workflow_id: workflow.id,
                            level: request.current_level,
                        });
                    }
                    RequestMachine::complete(&mut request, now);
                    events.push(ApprovalEvent::Completed {
                        request_id: request.id,
                        approved_by: actor,
                    });
                }
            }
        }

        self.commit(&mut request, expected, Transition::Resolve, now, events)
            .await?;
        Ok(request)
    }

    /// Escalates every request pending past its due date at `now`.
    ///
    /// Pending requests whose matched rule has a step for the current level
    /// that is due get that step's action emitted, once per level, even
    /// before the level's own window runs out.
    ///
    /// Requests with configuration problems are logged and skipped; a request
    /// changed by a concurrent writer is skipped. Running the sweep again
    /// without intervening changes escalates nothing and emits nothing.
    ///
    /// # Returns
    /// The requests escalated by this sweep.
    ///
    /// # Errors
    /// Only store failures abort the sweep.
    pub async fn sweep_escalations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let overdue = self.store.overdue(now).await?;
        let mut escalated = Vec::with_capacity(overdue.len());

        for request in overdue {
            let id = request.id;
            match self.escalate_one(request, now).await {
                Ok(Some(request)) => escalated.push(request),
                Ok(None) => debug!(request_id = %id, "request changed during sweep, skipped"),
                Err(err) if err.kind() == ErrorKind::Store => return Err(err),
                Err(err) => Self::log_skipped(id, &err),
            }
        }

        let mut actions = 0usize;
        for request in self.store.pending_with_rule().await? {
            let id = request.id;
            match self.emit_escalation_action(request, now).await {
                Ok(true) => actions += 1,
                Ok(false) => {}
                Err(err) if err.kind() == ErrorKind::Store => return Err(err),
                Err(err) => Self::log_skipped(id, &err),
            }
        }

        if !escalated.is_empty() || actions > 0 {
            info!(
                count = escalated.len(),
                actions,
                %now,
                "escalation sweep finished"
            );
        }
        Ok(escalated)
    }

    /// Pending requests waiting on `user`.
    pub async fn pending_for(&self, user: UserId) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        self.store.pending_for(user).await
    }

    /// Pending requests past their due date.
    pub async fn overdue(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        self.store.overdue(self.clock.now()).await
    }

    /// Every request raised for a document.
    pub async fn by_document(
        &self,
        document_type: &str,
        document_id: DocumentId,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        self.store
            .by_document(&DocumentRef::new(document_type, document_id))
            .await
    }

    /// Loads a request.
    pub async fn request(&self, id: ApprovalRequestId) -> Result<ApprovalRequest, ApprovalError> {
        self.load(id).await
    }

    async fn escalate_one(
        &self,
        mut request: ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<ApprovalRequest>, ApprovalError> {
        let expected = request.version;
        let workflow = self.load_workflow(request.workflow_id).await?;

        let level = request.current_level;
        if !RequestMachine::escalate_if_overdue(&mut request, now) {
            return Ok(None);
        }
        let mut events = vec![ApprovalEvent::Escalated {
            request_id: request.id,
            level,
            reason: OVERDUE_REASON.to_string(),
        }];

        if let Some(step) = Self::escalation_step(&workflow, &request)
            && RequestMachine::take_escalation_action(&mut request, &step, now)
        {
            events.push(ApprovalEvent::EscalationAction {
                request_id: request.id,
                level,
                action: step.action,
            });
        }

        if workflow.auto_escalate {
            match self
                .route_escalated(&workflow, &mut request, now, &mut events)
                .await
            {
                Ok(true) => {}
                Ok(false) if workflow.require_all_levels => {
                    let err = ApprovalError::MissingNextLevel {
                        workflow_id: workflow.id,
                        level,
                    };
                    warn!(request_id = %request.id, error = %err, "request stays escalated");
                }
                Ok(false) => {}
                Err(err) if err.is_configuration() => {
                    warn!(request_id = %request.id, error = %err, "request stays escalated");
                }
                Err(err) => return Err(err),
            }
        }

        request.version = expected + 1;
        if !self.store.update_request(&request, expected).await? {
            return Ok(None);
        }
        self.publish(events).await;
        Ok(Some(request))
    }

    /// Emits the current level's rule action for a pending request once due.
    ///
    /// Returns whether the action was committed and published.
    async fn emit_escalation_action(
        &self,
        mut request: ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<bool, ApprovalError> {
        let expected = request.version;
        let workflow = self.load_workflow(request.workflow_id).await?;
        let Some(step) = Self::escalation_step(&workflow, &request) else {
            return Ok(false);
        };
        if !RequestMachine::take_escalation_action(&mut request, &step, now) {
            return Ok(false);
        }

        request.version = expected + 1;
        if !self.store.update_request(&request, expected).await? {
            debug!(request_id = %request.id, "request changed during sweep, skipped");
            return Ok(false);
        }
        self.publish(vec![ApprovalEvent::EscalationAction {
            request_id: request.id,
            level: request.current_level,
            action: step.action,
        }])
        .await;
        Ok(true)
    }

    /// The matched rule's escalation step for the request's current level.
    fn escalation_step(workflow: &Workflow, request: &ApprovalRequest) -> Option<EscalationStep> {
        request
            .rule_id
            .and_then(|rule_id| workflow.rule(rule_id))
            .and_then(|rule| rule.escalation_for(request.current_level))
            .copied()
    }

    fn log_skipped(id: ApprovalRequestId, err: &ApprovalError) {
        warn!(
            request_id = %id,
            error = %err,
            code = err.error_code(),
            "escalation skipped"
        );
    }

    /// Re-enters pending at the next active level.
    ///
    /// Returns false, leaving the request untouched, when none exists.
    async fn route_escalated(
        &self,
        workflow: &Workflow,
        request: &mut ApprovalRequest,
        now: DateTime<Utc>,
        events: &mut Vec<ApprovalEvent>,
    ) -> Result<bool, ApprovalError> {
        let Some(next) = WorkflowResolver::next_level(workflow, request.current_level) else {
            return Ok(false);
        };
        let approver = resolve_approver(self.directory.as_ref(), next).await?;
        let from = request.current_level;
        RequestMachine::enter_level(request, next, approver, now);
        info!(
            request_id = %request.id,
            from_level = from,
            to_level = next.level,
            approver_id = %approver,
            "escalated request routed to next level"
        );
        events.push(ApprovalEvent::Routed {
            request_id: request.id,
            level: next.level,
            approver_id: approver,
        });
        Ok(true)
    }

    /// Records approval of the current level by `approved_by`.
    async fn advance(
        &self,
        workflow: &Workflow,
        request: &mut ApprovalRequest,
        approved_by: UserId,
        now: DateTime<Utc>,
        events: &mut Vec<ApprovalEvent>,
    ) -> Result<(), ApprovalError> {
        let next = if workflow.require_all_levels {
            WorkflowResolver::next_level(workflow, request.current_level)
        } else {
            None
        };

        match next {
            Some(level) => {
                let approver = resolve_approver(self.directory.as_ref(), level).await?;
                let from = request.current_level;
                RequestMachine::enter_level(request, level, approver, now);
                info!(
                    request_id = %request.id,
                    from_level = from,
                    to_level = level.level,
                    approver_id = %approver,
                    "approval request advanced"
                );
                events.push(ApprovalEvent::LevelApproved {
                    request_id: request.id,
                    level: from,
                    approved_by,
                    next_approver_id: approver,
                });
            }
            None => {
                RequestMachine::complete(request, now);
                events.push(ApprovalEvent::Completed {
                    request_id: request.id,
                    approved_by,
                });
            }
        }
        Ok(())
    }

    /// Approves levels that let the requestor approve their own request.
    async fn settle_self_approvals(
        &self,
        workflow: &Workflow,
        request: &mut ApprovalRequest,
        now: DateTime<Utc>,
        events: &mut Vec<ApprovalEvent>,
    ) -> Result<(), ApprovalError> {
        while request.is_pending() && request.approver_id == request.requestor_id {
            let self_approvable = workflow
                .level(request.current_level)
                .is_some_and(|l| l.auto_approve_if_same_user);
            if !self_approvable {
                break;
            }
            debug!(request_id = %request.id, level = request.current_level, "level self-approved");
            let requestor = request.requestor_id;
            self.advance(workflow, request, requestor, now, events)
                .await?;
        }
        Ok(())
    }

    /// Applies the write-time overdue check and commits.
    async fn commit(
        &self,
        request: &mut ApprovalRequest,
        expected: i64,
        action: Transition,
        now: DateTime<Utc>,
        mut events: Vec<ApprovalEvent>,
    ) -> Result<(), ApprovalError> {
        let level = request.current_level;
        if RequestMachine::escalate_if_overdue(request, now) {
            events.push(ApprovalEvent::Escalated {
                request_id: request.id,
                level,
                reason: OVERDUE_REASON.to_string(),
            });
        }

        request.version = expected + 1;
        if !self.store.update_request(request, expected).await? {
            return Err(self.conflict(request.id, expected, action).await);
        }
        self.publish(events).await;
        Ok(())
    }

    /// Describes a lost compare-and-set.
    async fn conflict(
        &self,
        id: ApprovalRequestId,
        expected: i64,
        action: Transition,
    ) -> ApprovalError {
        match self.store.request(id).await {
            Ok(Some(current)) => RequestMachine::ensure_version(&current, expected, action)
                .err()
                .unwrap_or(ApprovalError::StaleRequest(id)),
            Ok(None) | Err(_) => ApprovalError::StaleRequest(id),
        }
    }

    async fn publish(&self, events: Vec<ApprovalEvent>) {
        for event in events {
            if let Err(err) = self.notifier.notify(&event).await {
                warn!(
                    event_type = event.event_type(),
                    request_id = ?event.request_id(),
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    }

    async fn select_workflow(
        &self,
        document_type: &str,
        amount: Decimal,
    ) -> Result<Workflow, ApprovalError> {
        let workflows = self.store.workflows_for(document_type).await?;
        WorkflowResolver::resolve_workflow(&workflows, document_type, amount)
            .cloned()
            .ok_or_else(|| ApprovalError::NoWorkflowFound {
                document_type: document_type.to_string(),
            })
    }

    async fn load(&self, id: ApprovalRequestId) -> Result<ApprovalRequest, ApprovalError> {
        self.store
            .request(id)
            .await?
            .ok_or(ApprovalError::RequestNotFound(id))
    }

    async fn load_workflow(&self, id: WorkflowId) -> Result<Workflow, ApprovalError> {
        self.store
            .workflow(id)
            .await?
            .ok_or(ApprovalError::WorkflowNotFound(id))
    }

    fn rule_fields(document: &dyn Approvable, amount: Decimal) -> DocumentFields {
        let mut fields = document.fields();
        fields.insert("amount".to_string(), Value::Number(amount));
        fields
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
