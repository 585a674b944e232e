//! Workflow selection and level ordering.

use rust_decimal::Decimal;

use crate::rules::rule::ApprovalRule;
use crate::rules::value::DocumentFields;
use crate::workflow::types::{ApprovalLevel, Workflow};

/// Stateless resolver over workflow definitions.
pub struct WorkflowResolver;

impl WorkflowResolver {
    /// Selects the workflow governing a document.
    ///
    /// Among active workflows for `document_type`, the one with the highest
    /// threshold the amount reaches wins, so larger amounts fall to higher
    /// tiers. When the amount is below every threshold the lowest-threshold
    /// workflow is returned, and the caller sees `can_auto_approve == true`
    /// for it. Equal thresholds are ordered by name, then id.
    ///
    /// # Returns
    /// The selected workflow, or `None` if no active workflow covers the type.
    #[must_use]
    pub fn resolve_workflow<'a>(
        workflows: &'a [Workflow],
        document_type: &str,
        amount: Decimal,
    ) -> Option<&'a Workflow> {
        let mut candidates: Vec<&Workflow> = workflows
            .iter()
            .filter(|w| w.is_active && w.document_type == document_type)
            .collect();

        // Highest threshold first; ties by name, then id.
        candidates.sort_by(|a, b| {
            b.threshold_amount
                .cmp(&a.threshold_amount)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.into_inner().cmp(&b.id.into_inner()))
        });

        let covering = candidates
            .iter()
            .find(|w| w.threshold_amount <= amount)
            .copied();
        covering.or_else(|| {
            let lowest = candidates.last()?.threshold_amount;
            candidates
                .iter()
                .find(|w| w.threshold_amount == lowest)
                .copied()
        })
    }

    /// Returns true if `amount` is below the workflow's threshold.
    #[must_use]
    pub fn can_auto_approve(workflow: &Workflow, amount: Decimal) -> bool {
        amount < workflow.threshold_amount
    }

    /// Returns the lowest active level.
    #[must_use]
    pub fn first_level(workflow: &Workflow) -> Option<&ApprovalLevel> {
        workflow
            .levels
            .iter()
            .filter(|l| l.is_active)
            .min_by_key(|l| l.level)
    }

    /// Returns the smallest active level above `current`, or `None` at the end.
    #[must_use]
    pub fn next_level(workflow: &Workflow, current: i32) -> Option<&ApprovalLevel> {
        workflow
            .levels
            .iter()
            .filter(|l| l.is_active && l.level > current)
            .min_by_key(|l| l.level)
    }

    /// Returns the highest active level number, or 0 without active levels.
    #[must_use]
    pub fn max_level(workflow: &Workflow) -> i32 {
        workflow
            .levels
            .iter()
            .filter(|l| l.is_active)
            .map(|l| l.level)
            .max()
            .unwrap_or(0)
    }

    /// Returns the highest-priority active rule matching the document.
    ///
    /// Lower `priority` values win; ties keep definition order.
    #[must_use]
    pub fn matching_rule<'a>(
        workflow: &'a Workflow,
        data: &DocumentFields,
    ) -> Option<&'a ApprovalRule> {
        let mut rules: Vec<&ApprovalRule> = workflow.rules.iter().collect();
        rules.sort_by_key(|r| r.priority);
        rules.into_iter().find(|r| r.matches(data))
    }

    /// Returns true if the matching rule asks for automatic submission.
    #[must_use]
    pub fn should_auto_trigger(workflow: &Workflow, data: &DocumentFields) -> bool {
        Self::matching_rule(workflow, data).is_some_and(|r| r.auto_trigger)
    }
}
