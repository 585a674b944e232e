//! Property-based tests for `WorkflowResolver`.

use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::workflow::resolver::WorkflowResolver;
use crate::workflow::types::{ApprovalLevel, ApproverBinding, Workflow};

fn arb_amount() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Level numbers 1..=n with a random activity mask.
fn arb_levels() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..8)
}

fn workflow_with(active: &[bool]) -> Workflow {
    let mut wf = Workflow::new("wf", "expense", Decimal::ZERO);
    for (n, is_active) in (1..).zip(active) {
        let mut level = ApprovalLevel::new(n, format!("L{n}"), ApproverBinding::Role("r".into()));
        level.is_active = *is_active;
        wf.levels.push(level);
    }
    wf
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The highest threshold the amount reaches governs; below every threshold
    /// the lowest one does and the document is auto-approvable.
    #[test]
    fn prop_resolved_workflow_covers_amount(
        thresholds in prop::collection::vec(arb_amount(), 1..6),
        amount in arb_amount(),
    ) {
        let workflows: Vec<Workflow> = thresholds
            .iter()
            .enumerate()
            .map(|(i, t)| Workflow::new(format!("wf{i}"), "expense", *t))
            .collect();

        let wf = WorkflowResolver::resolve_workflow(&workflows, "expense", amount);
        prop_assert!(wf.is_some());
        let wf = wf.unwrap();

        let any_covers = thresholds.iter().any(|t| *t <= amount);
        prop_assert_eq!(WorkflowResolver::can_auto_approve(wf, amount), !any_covers);
        let expected = if any_covers {
            thresholds.iter().filter(|t| **t <= amount).max().copied()
        } else {
            thresholds.iter().min().copied()
        };
        prop_assert_eq!(Some(wf.threshold_amount), expected);
    }

    /// Walking `next_level` from `first_level` visits exactly the active levels in order.
    #[test]
    fn prop_level_walk_visits_active_levels(mask in arb_levels()) {
        let wf = workflow_with(&mask);
        let expected: Vec<i32> = (1..)
            .zip(&mask)
            .filter(|(_, active)| **active)
            .map(|(n, _)| n)
            .collect();

        let mut visited = Vec::new();
        let mut current = WorkflowResolver::first_level(&wf);
        while let Some(level) = current {
            visited.push(level.level);
            current = WorkflowResolver::next_level(&wf, level.level);
        }

        prop_assert_eq!(&visited, &expected);
        prop_assert_eq!(
            WorkflowResolver::max_level(&wf),
            expected.last().copied().unwrap_or(0)
        );
    }
}
