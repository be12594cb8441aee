//! Policy-combining algorithms.

use crate::domain::{CombiningAlgorithm, Decision};
use uuid::Uuid;

/// Outcome of a single policy, carrying its own priority so combination does
/// not depend on the order decisions were collected in.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    pub policy_id: Uuid,
    pub decision: Decision,
    pub priority: i32,
    pub rule_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combined {
    pub decision: Decision,
    pub policy_id: Option<Uuid>,
    pub rule_id: Option<String>,
}

impl Combined {
    fn from_decision(d: &PolicyDecision) -> Self {
        Self {
            decision: d.decision,
            policy_id: Some(d.policy_id),
            rule_id: d.rule_id.clone(),
        }
    }

    fn bare(decision: Decision) -> Self {
        Self {
            decision,
            policy_id: None,
            rule_id: None,
        }
    }
}

fn first_with(decisions: &[PolicyDecision], wanted: Decision) -> Option<Combined> {
    decisions
        .iter()
        .find(|d| d.decision == wanted)
        .map(Combined::from_decision)
}

fn first_definitive<'a>(decisions: impl IntoIterator<Item = &'a PolicyDecision>) -> Combined {
    decisions
        .into_iter()
        .find(|d| d.decision.is_definitive())
        .map(Combined::from_decision)
        .unwrap_or_else(|| Combined::bare(Decision::NotApplicable))
}

/// Combines per-policy decisions. `decisions` is expected in evaluation order
/// (priority descending); `highest_priority` re-sorts stably on its own.
pub fn combine(algorithm: CombiningAlgorithm, decisions: &[PolicyDecision]) -> Combined {
    if decisions.is_empty() {
        return Combined::bare(Decision::NotApplicable);
    }

    match algorithm {
        CombiningAlgorithm::DenyOverrides => first_with(decisions, Decision::Deny)
            .or_else(|| first_with(decisions, Decision::Allow))
            .unwrap_or_else(|| Combined::bare(Decision::NotApplicable)),
        CombiningAlgorithm::PermitOverrides => first_with(decisions, Decision::Allow)
            .or_else(|| first_with(decisions, Decision::Deny))
            .unwrap_or_else(|| Combined::bare(Decision::NotApplicable)),
        CombiningAlgorithm::FirstApplicable => first_definitive(decisions),
        CombiningAlgorithm::HighestPriority => {
            let mut sorted: Vec<&PolicyDecision> = decisions.iter().collect();
            sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
            first_definitive(sorted)
        }
        CombiningAlgorithm::OnlyOneApplicable => {
            let mut definitive = decisions.iter().filter(|d| d.decision.is_definitive());
            match (definitive.next(), definitive.next()) {
                (Some(only), None) => Combined::from_decision(only),
                _ => Combined::bare(Decision::Indeterminate),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn d(decision: Decision, priority: i32) -> PolicyDecision {
        PolicyDecision {
            policy_id: Uuid::new_v4(),
            decision,
            priority,
            rule_id: Some(format!("rule-{priority}")),
        }
    }

    #[rstest]
    #[case::deny_overrides(CombiningAlgorithm::DenyOverrides, Decision::Deny)]
    #[case::permit_overrides(CombiningAlgorithm::PermitOverrides, Decision::Allow)]
    #[case::first_applicable(CombiningAlgorithm::FirstApplicable, Decision::Allow)]
    #[case::highest_priority(CombiningAlgorithm::HighestPriority, Decision::Allow)]
    #[case::only_one_applicable(CombiningAlgorithm::OnlyOneApplicable, Decision::Indeterminate)]
    fn test_allow_then_deny(#[case] algorithm: CombiningAlgorithm, #[case] expected: Decision) {
        let decisions = vec![d(Decision::Allow, 10), d(Decision::Deny, 5)];
        assert_eq!(combine(algorithm, &decisions).decision, expected);
    }

    #[rstest]
    #[case(CombiningAlgorithm::DenyOverrides)]
    #[case(CombiningAlgorithm::PermitOverrides)]
    #[case(CombiningAlgorithm::FirstApplicable)]
    #[case(CombiningAlgorithm::HighestPriority)]
    #[case(CombiningAlgorithm::OnlyOneApplicable)]
    fn test_empty_is_not_applicable(#[case] algorithm: CombiningAlgorithm) {
        let combined = combine(algorithm, &[]);
        assert_eq!(combined.decision, Decision::NotApplicable);
        assert_eq!(combined.policy_id, None);
    }

    #[test]
    fn test_reports_deciding_policy_and_rule() {
        let allow = d(Decision::Allow, 1);
        let deny = d(Decision::Deny, 0);
        let combined = combine(
            CombiningAlgorithm::DenyOverrides,
            &[allow, deny.clone()],
        );
        assert_eq!(combined.policy_id, Some(deny.policy_id));
        assert_eq!(combined.rule_id, deny.rule_id);
    }

    #[test]
    fn test_only_one_applicable_ignores_not_applicable() {
        let only = d(Decision::Deny, 1);
        let decisions = vec![d(Decision::NotApplicable, 5), only.clone()];
        let combined = combine(CombiningAlgorithm::OnlyOneApplicable, &decisions);
        assert_eq!(combined.decision, Decision::Deny);
        assert_eq!(combined.policy_id, Some(only.policy_id));

        let none = vec![d(Decision::NotApplicable, 5)];
        assert_eq!(
            combine(CombiningAlgorithm::OnlyOneApplicable, &none).decision,
            Decision::Indeterminate
        );
    }

    #[test]
    fn test_highest_priority_uses_carried_priority() {
        // Out of order on purpose.
        let low = d(Decision::Allow, 1);
        let high = d(Decision::Deny, 9);
        let combined = combine(CombiningAlgorithm::HighestPriority, &[low, high.clone()]);
        assert_eq!(combined.decision, Decision::Deny);
        assert_eq!(combined.policy_id, Some(high.policy_id));
    }

    #[test]
    fn test_highest_priority_tie_keeps_order() {
        let first = d(Decision::Allow, 3);
        let second = d(Decision::Deny, 3);
        let combined = combine(CombiningAlgorithm::HighestPriority, &[first.clone(), second]);
        assert_eq!(combined.policy_id, Some(first.policy_id));
    }

    #[test]
    fn test_first_applicable_skips_not_applicable() {
        let decisions = vec![d(Decision::NotApplicable, 9), d(Decision::Deny, 1)];
        assert_eq!(
            combine(CombiningAlgorithm::FirstApplicable, &decisions).decision,
            Decision::Deny
        );
        let nothing = vec![d(Decision::NotApplicable, 9)];
        assert_eq!(
            combine(CombiningAlgorithm::DenyOverrides, &nothing).decision,
            Decision::NotApplicable
        );
    }
}
