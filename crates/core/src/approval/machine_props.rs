//! Property-based tests for `RequestMachine`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use quorum_shared::types::{ApprovalRequestId, DocumentId, UserId, WorkflowId};

use crate::approval::error::{ApprovalError, ErrorKind, Transition};
use crate::approval::machine::RequestMachine;
use crate::approval::types::{ApprovalRequest, ApprovalStatus, DocumentRef, Priority};
use crate::rules::value::DocumentFields;
use crate::workflow::types::{ApprovalLevel, ApproverBinding};

/// Operations applied to a request in sequence.
#[derive(Debug, Clone)]
enum Op {
    Reject { by_approver: bool, comments: String },
    Delegate { by_approver: bool },
    Escalate { hours: i64 },
    Enter { level: i32 },
    Complete,
    ApproveEscalated { by_approver: bool },
}

fn arb_status() -> impl Strategy<Value = ApprovalStatus> {
    prop_oneof![
        Just(ApprovalStatus::Pending),
        Just(ApprovalStatus::Approved),
        Just(ApprovalStatus::Rejected),
        Just(ApprovalStatus::Escalated),
        Just(ApprovalStatus::Completed),
    ]
}

fn arb_user() -> impl Strategy<Value = UserId> {
    any::<u128>().prop_map(|n| UserId::from_uuid(Uuid::from_u128(n)))
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<bool>(), "[a-z ]{0,8}")
            .prop_map(|(by_approver, comments)| Op::Reject { by_approver, comments }),
        any::<bool>().prop_map(|by_approver| Op::Delegate { by_approver }),
        (0i64..72).prop_map(|hours| Op::Escalate { hours }),
        (1i32..5).prop_map(|level| Op::Enter { level }),
        Just(Op::Complete),
        any::<bool>().prop_map(|by_approver| Op::ApproveEscalated { by_approver }),
    ]
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn request(approver: UserId, status: ApprovalStatus) -> ApprovalRequest {
    let now = epoch();
    let mut request = ApprovalRequest {
        id: ApprovalRequestId::new(),
        workflow_id: WorkflowId::new(),
        rule_id: None,
        document: DocumentRef::new("expense", DocumentId::new()),
        requestor_id: UserId::new(),
        approver_id: approver,
        amount: Decimal::ONE_HUNDRED,
        priority: Priority::Medium,
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
    };
    request.status = status;
    match status {
        ApprovalStatus::Pending => {}
        ApprovalStatus::Approved => request.approved_at = Some(now),
        ApprovalStatus::Rejected => request.rejected_at = Some(now),
        ApprovalStatus::Completed => request.completed_at = Some(now),
        ApprovalStatus::Escalated => request.escalated_at = Some(now),
    }
    request
}

fn level(n: i32) -> ApprovalLevel {
    ApprovalLevel::new(n, format!("L{n}"), ApproverBinding::Role("r".into()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Any sequence of transitions keeps status and timestamps consistent.
    #[test]
    fn prop_timestamps_stay_consistent(ops in prop::collection::vec(arb_op(), 0..20)) {
        let approver = UserId::new();
        let mut req = request(approver, ApprovalStatus::Pending);
        let mut now = epoch();

        for op in ops {
            now += Duration::hours(1);
            let actor = |by_approver: bool, req: &ApprovalRequest| {
                if by_approver { req.approver_id } else { UserId::new() }
            };
            match op {
                Op::Reject { by_approver, comments } => {
                    let who = actor(by_approver, &req);
                    let _ = RequestMachine::reject(&mut req, who, comments, now);
                }
                Op::Delegate { by_approver } => {
                    let who = actor(by_approver, &req);
                    let current = level(req.current_level);
                    let _ = RequestMachine::delegate(&mut req, &current, who, UserId::new(), now);
                }
                Op::Escalate { hours } => {
                    let at = now + Duration::hours(hours);
                    let _ = RequestMachine::escalate_if_overdue(&mut req, at);
                }
                Op::Enter { level: n } => {
                    if !req.status.is_terminal() {
                        RequestMachine::enter_level(&mut req, &level(n), UserId::new(), now);
                    }
                }
                Op::Complete => {
                    if req.is_pending() {
                        RequestMachine::complete(&mut req, now);
                    }
                }
                Op::ApproveEscalated { by_approver } => {
                    let who = actor(by_approver, &req);
                    let _ = RequestMachine::approve_escalated(&mut req, who, None, now);
                }
            }
            prop_assert!(req.timestamps_consistent(), "inconsistent after step: {:?}", req);
        }
    }

    /// Acting as anyone but the bound approver fails and leaves the request unchanged.
    #[test]
    fn prop_non_approver_cannot_act(
        approver in arb_user(),
        stranger in arb_user(),
        comments in "[a-z]{1,10}",
    ) {
        prop_assume!(approver != stranger);
        let mut req = request(approver, ApprovalStatus::Pending);
        let before = req.clone();

        let reject = RequestMachine::reject(&mut req, stranger, comments, epoch());
        prop_assert!(
            matches!(reject, Err(ApprovalError::NotAuthorized { .. })),
            "reject by stranger: {:?}",
            reject
        );

        let delegate =
            RequestMachine::delegate(&mut req, &level(1), stranger, UserId::new(), epoch());
        prop_assert!(
            matches!(delegate, Err(ApprovalError::NotAuthorized { .. })),
            "delegate by stranger: {:?}",
            delegate
        );

        let approve = RequestMachine::guard_pending(&req, stranger, Transition::Approve);
        prop_assert_eq!(approve.map_err(|e| e.kind()), Err(ErrorKind::Authorization));

        prop_assert_eq!(req, before);
    }

    /// Only pending requests accept approver transitions; strangers are
    /// refused whatever the status.
    #[test]
    fn prop_non_pending_is_invalid_state(
        status in arb_status(),
        approver in arb_user(),
        stranger in arb_user(),
    ) {
        prop_assume!(status != ApprovalStatus::Pending);
        prop_assume!(approver != stranger);
        let req = request(approver, status);
        let result = RequestMachine::guard_pending(&req, approver, Transition::Approve);
        prop_assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::InvalidState));
        let result = RequestMachine::guard_pending(&req, stranger, Transition::Approve);
        prop_assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::Authorization));
    }

    /// Escalation fires exactly once, only after the due date.
    #[test]
    fn prop_escalation_once_after_due(offset_minutes in -3000i64..3000) {
        let mut req = request(UserId::new(), ApprovalStatus::Pending);
        let now = req.due_date + Duration::minutes(offset_minutes);

        let first = RequestMachine::escalate_if_overdue(&mut req, now);
        prop_assert_eq!(first, offset_minutes > 0);
        prop_assert!(!RequestMachine::escalate_if_overdue(&mut req, now));
    }
}
