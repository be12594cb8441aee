//! Applicability checks run before any condition is evaluated.

use super::pattern::matches_any;
use crate::domain::{EvaluationRequest, Policy, PolicyRule};

/// A rule applies when both its resource and action pattern sets match.
pub fn rule_applies(rule: &PolicyRule, resource: &str, action: &str) -> bool {
    matches_any(resource, &rule.resources) && matches_any(action, &rule.actions)
}

pub fn has_matching_rule(policy: &Policy, resource: &str, action: &str) -> bool {
    policy
        .rules
        .iter()
        .any(|rule| rule_applies(rule, resource, action))
}

/// Checks the target resource/action lists only. Empty lists match all.
fn resource_action_target_matches(policy: &Policy, resource: &str, action: &str) -> bool {
    let targets = &policy.targets;
    (targets.resources.is_empty() || matches_any(resource, &targets.resources))
        && (targets.actions.is_empty() || matches_any(action, &targets.actions))
}

/// Full target check against a request. Subject patterns are matched against
/// the subject id and every role the subject carries.
pub fn target_matches(policy: &Policy, request: &EvaluationRequest) -> bool {
    let targets = &policy.targets;

    if !targets.subjects.is_empty() {
        let mut identities = request.subject_roles();
        if let Some(id) = request.subject_id() {
            identities.push(id);
        }
        if !identities
            .iter()
            .any(|identity| matches_any(identity, &targets.subjects))
        {
            return false;
        }
    }

    if !targets.tenants.is_empty()
        && !matches_any(&request.tenant_id.to_string(), &targets.tenants)
    {
        return false;
    }

    resource_action_target_matches(policy, request.resource_type(), request.action_name())
}

/// Store-side pre-filter for a resource/action pair.
pub fn applies_to(policy: &Policy, resource: &str, action: &str) -> bool {
    policy.enabled
        && resource_action_target_matches(policy, resource, action)
        && has_matching_rule(policy, resource, action)
}

/// Engine-side candidate check for a full request.
pub fn is_candidate(policy: &Policy, request: &EvaluationRequest) -> bool {
    policy.enabled
        && target_matches(policy, request)
        && has_matching_rule(policy, request.resource_type(), request.action_name())
}
