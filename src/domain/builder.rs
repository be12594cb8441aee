//! Fluent constructors for policies, rules and condition trees.
//!
//! ```
//! use crm_iam_abac::domain::builder::*;
//! use uuid::Uuid;
//!
//! let policy = PolicyBuilder::new(Uuid::new_v4(), "sales-read")
//!     .with_priority(10)
//!     .add_rule(
//!         RuleBuilder::allow()
//!             .with_actions(["read"])
//!             .with_resources(["customer"])
//!             .with_conditions(and([equals(subject_attr("department"), "sales")]))
//!             .build(),
//!     )
//!     .build();
//! assert!(policy.enabled);
//! ```

use super::attribute::{AttributeSource, AttributeValue};
use super::policy::{
    Advice, AttributeReference, Condition, ConditionGroup, ConditionOperator, Effect,
    LogicalOperator, Obligation, Policy, PolicyMetadata, PolicyRule, PolicyTarget,
};
use uuid::Uuid;

pub struct PolicyBuilder {
    policy: Policy,
}

impl PolicyBuilder {
    /// Starts an enabled policy with a fresh id.
    pub fn new(tenant_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            policy: Policy {
                id: Uuid::new_v4(),
                tenant_id,
                name: name.into(),
                enabled: true,
                ..Default::default()
            },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.policy.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.policy.priority = priority;
        self
    }

    pub fn with_targets(mut self, targets: PolicyTarget) -> Self {
        self.policy.targets = targets;
        self
    }

    pub fn with_metadata(mut self, metadata: PolicyMetadata) -> Self {
        self.policy.metadata = metadata;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.policy.enabled = enabled;
        self
    }

    pub fn add_rule(mut self, rule: PolicyRule) -> Self {
        self.policy.rules.push(rule);
        self
    }

    pub fn build(mut self) -> Policy {
        self.policy.assign_missing_identifiers();
        self.policy
    }
}

pub struct RuleBuilder {
    rule: PolicyRule,
}

impl RuleBuilder {
    pub fn new(effect: Effect) -> Self {
        Self {
            rule: PolicyRule {
                id: Uuid::new_v4().to_string(),
                effect,
                ..Default::default()
            },
        }
    }

    pub fn allow() -> Self {
        Self::new(Effect::Allow)
    }

    pub fn deny() -> Self {
        Self::new(Effect::Deny)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.rule.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.rule.description = description.into();
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionGroup) -> Self {
        self.rule.conditions = Some(conditions);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.rule.priority = priority;
        self
    }

    pub fn with_obligation(mut self, obligation: Obligation) -> Self {
        self.rule.obligations.push(obligation);
        self
    }

    pub fn with_advice(mut self, advice: Advice) -> Self {
        self.rule.advice.push(advice);
        self
    }

    pub fn build(self) -> PolicyRule {
        self.rule
    }
}

/// Builds a group mixing conditions and nested groups.
pub struct ConditionGroupBuilder {
    group: ConditionGroup,
}

impl ConditionGroupBuilder {
    pub fn new(operator: LogicalOperator) -> Self {
        Self {
            group: ConditionGroup {
                operator,
                ..Default::default()
            },
        }
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.group.conditions.push(condition);
        self
    }

    pub fn group(mut self, group: ConditionGroup) -> Self {
        self.group.groups.push(group);
        self
    }

    pub fn build(self) -> ConditionGroup {
        self.group
    }
}

pub fn and(conditions: impl IntoIterator<Item = Condition>) -> ConditionGroup {
    ConditionGroup {
        operator: LogicalOperator::And,
        conditions: conditions.into_iter().collect(),
        groups: Vec::new(),
    }
}

pub fn or(conditions: impl IntoIterator<Item = Condition>) -> ConditionGroup {
    ConditionGroup {
        operator: LogicalOperator::Or,
        conditions: conditions.into_iter().collect(),
        groups: Vec::new(),
    }
}

pub fn not(condition: Condition) -> ConditionGroup {
    ConditionGroup {
        operator: LogicalOperator::Not,
        conditions: vec![condition],
        groups: Vec::new(),
    }
}

pub fn subject_attr(key: impl Into<String>) -> AttributeReference {
    AttributeReference::new(AttributeSource::Subject, key)
}

pub fn resource_attr(key: impl Into<String>) -> AttributeReference {
    AttributeReference::new(AttributeSource::Resource, key)
}

pub fn action_attr(key: impl Into<String>) -> AttributeReference {
    AttributeReference::new(AttributeSource::Action, key)
}

pub fn env_attr(key: impl Into<String>) -> AttributeReference {
    AttributeReference::new(AttributeSource::Environment, key)
}

pub fn context_attr(key: impl Into<String>) -> AttributeReference {
    AttributeReference::new(AttributeSource::Context, key)
}

fn condition(
    attribute: AttributeReference,
    operator: ConditionOperator,
    value: impl Into<AttributeValue>,
) -> Condition {
    Condition {
        attribute,
        operator,
        value: value.into(),
    }
}

pub fn equals(attribute: AttributeReference, value: impl Into<AttributeValue>) -> Condition {
    condition(attribute, ConditionOperator::Equals, value)
}

pub fn not_equals(attribute: AttributeReference, value: impl Into<AttributeValue>) -> Condition {
    condition(attribute, ConditionOperator::NotEquals, value)
}

pub fn contains(attribute: AttributeReference, value: impl Into<AttributeValue>) -> Condition {
    condition(attribute, ConditionOperator::Contains, value)
}

pub fn in_list<I, V>(attribute: AttributeReference, values: I) -> Condition
where
    I: IntoIterator<Item = V>,
    V: Into<AttributeValue>,
{
    let values: Vec<AttributeValue> = values.into_iter().map(Into::into).collect();
    condition(attribute, ConditionOperator::In, AttributeValue::List(values))
}

pub fn not_in_list<I, V>(attribute: AttributeReference, values: I) -> Condition
where
    I: IntoIterator<Item = V>,
    V: Into<AttributeValue>,
{
    let values: Vec<AttributeValue> = values.into_iter().map(Into::into).collect();
    condition(attribute, ConditionOperator::NotIn, AttributeValue::List(values))
}

pub fn greater_than(attribute: AttributeReference, value: impl Into<AttributeValue>) -> Condition {
    condition(attribute, ConditionOperator::GreaterThan, value)
}

pub fn less_than(attribute: AttributeReference, value: impl Into<AttributeValue>) -> Condition {
    condition(attribute, ConditionOperator::LessThan, value)
}

pub fn between(
    attribute: AttributeReference,
    low: impl Into<AttributeValue>,
    high: impl Into<AttributeValue>,
) -> Condition {
    condition(
        attribute,
        ConditionOperator::Between,
        AttributeValue::List(vec![low.into(), high.into()]),
    )
}

pub fn matches(attribute: AttributeReference, pattern: impl Into<String>) -> Condition {
    condition(attribute, ConditionOperator::Matches, pattern.into())
}

pub fn exists(attribute: AttributeReference) -> Condition {
    condition(attribute, ConditionOperator::Exists, AttributeValue::Null)
}

pub fn ip_in_cidr(attribute: AttributeReference, cidr: impl Into<String>) -> Condition {
    condition(attribute, ConditionOperator::IpInCidr, cidr.into())
}

pub fn time_in_range(attribute: AttributeReference, range: impl Into<String>) -> Condition {
    condition(attribute, ConditionOperator::TimeInRange, range.into())
}

pub fn day_of_week_in<I, S>(attribute: AttributeReference, days: I) -> Condition
where
    I: IntoIterator<Item = S>,
    S: Into<AttributeValue>,
{
    let days: Vec<AttributeValue> = days.into_iter().map(Into::into).collect();
    condition(attribute, ConditionOperator::DayOfWeekIn, AttributeValue::List(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_builder_defaults() {
        let tenant = Uuid::new_v4();
        let policy = PolicyBuilder::new(tenant, "p")
            .with_description("d")
            .with_priority(3)
            .add_rule(
                RuleBuilder::deny()
                    .with_id("")
                    .with_actions(["delete"])
                    .with_resources(["deal"])
                    .build(),
            )
            .build();
        assert_eq!(policy.tenant_id, tenant);
        assert!(policy.enabled);
        assert_eq!(policy.priority, 3);
        assert!(!policy.rules[0].id.is_empty());
        assert_eq!(policy.rules[0].effect, Effect::Deny);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_condition_shorthands() {
        let c = in_list(subject_attr("role"), ["admin", "manager"]);
        assert_eq!(c.operator, ConditionOperator::In);
        assert_eq!(c.value.as_list().map(|l| l.len()), Some(2));

        let c = between(subject_attr("level"), 1, 5);
        assert_eq!(c.operator, ConditionOperator::Between);
        assert!(c.validate().is_ok());

        let c = exists(resource_attr("owner_id"));
        assert!(c.value.is_null());

        let group = ConditionGroupBuilder::new(LogicalOperator::Or)
            .condition(equals(env_attr("is_weekend"), true))
            .group(not(ip_in_cidr(context_attr("client_ip"), "10.0.0.0/8")))
            .build();
        assert_eq!(group.conditions.len(), 1);
        assert_eq!(group.groups.len(), 1);
        assert!(group.validate().is_ok());
    }
}
