//! ABAC policy domain models.

use super::attribute::{AttributeSource, AttributeValue};
use super::operand;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MAX_POLICY_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    In,
    NotIn,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Between,
    Exists,
    NotExists,
    IsEmpty,
    IsNotEmpty,
    IpInCidr,
    TimeInRange,
    DayOfWeekIn,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::Contains => "contains",
            ConditionOperator::NotContains => "not_contains",
            ConditionOperator::StartsWith => "starts_with",
            ConditionOperator::EndsWith => "ends_with",
            ConditionOperator::Matches => "matches",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::GreaterOrEqual => "greater_or_equal",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::LessOrEqual => "less_or_equal",
            ConditionOperator::Between => "between",
            ConditionOperator::Exists => "exists",
            ConditionOperator::NotExists => "not_exists",
            ConditionOperator::IsEmpty => "is_empty",
            ConditionOperator::IsNotEmpty => "is_not_empty",
            ConditionOperator::IpInCidr => "ip_in_cidr",
            ConditionOperator::TimeInRange => "time_in_range",
            ConditionOperator::DayOfWeekIn => "day_of_week_in",
        }
    }

    /// Operators that only look at presence/emptiness and ignore the operand.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            ConditionOperator::Exists
                | ConditionOperator::NotExists
                | ConditionOperator::IsEmpty
                | ConditionOperator::IsNotEmpty
        )
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeReference {
    pub source: AttributeSource,
    pub key: String,
}

impl AttributeReference {
    pub fn new(source: AttributeSource, key: impl Into<String>) -> Self {
        Self {
            source,
            key: key.into(),
        }
    }
}

impl fmt::Display for AttributeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: AttributeReference,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: AttributeValue,
}

impl Condition {
    pub fn new(
        source: AttributeSource,
        key: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            attribute: AttributeReference::new(source, key),
            operator,
            value: value.into(),
        }
    }

    /// Checks that the operand has the shape the operator needs.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| {
            Err(AppError::InvalidCondition(format!(
                "{} {}: {}",
                self.attribute, self.operator, msg
            )))
        };

        if self.attribute.key.trim().is_empty() {
            return invalid("attribute key is empty");
        }

        match self.operator {
            ConditionOperator::Between if operand::between_bounds(&self.value).is_none() => {
                invalid("expected a [min, max] pair of numbers")
            }
            ConditionOperator::IpInCidr if operand::networks(&self.value).is_none() => {
                invalid("expected a CIDR block or a list of CIDR blocks")
            }
            ConditionOperator::TimeInRange
                if operand::ClockWindow::parse(&self.value).is_none() =>
            {
                invalid("expected a HH:MM-HH:MM range")
            }
            ConditionOperator::DayOfWeekIn if operand::day_set(&self.value).is_none() => {
                invalid("expected day names or numbers 0-6")
            }
            ConditionOperator::Matches => match self.value.as_str() {
                Some(pattern) if Regex::new(pattern).is_ok() => Ok(()),
                Some(_) => invalid("pattern does not compile"),
                None => invalid("expected a regular expression string"),
            },
            _ => Ok(()),
        }
    }
}

/// Logical combination of conditions and nested groups. `not` negates its
/// first child only, looking at conditions before groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConditionGroup {
    pub operator: LogicalOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<ConditionGroup>,
}

impl ConditionGroup {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.groups.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.operator == LogicalOperator::Not && self.is_empty() {
            return Err(AppError::InvalidCondition(
                "not group must have at least one child".to_string(),
            ));
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        for group in &self.groups {
            group.validate()?;
        }
        Ok(())
    }
}

/// Action attached to a decision that the enforcement point must carry out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, AttributeValue>,
}

/// Non-binding recommendation attached to a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PolicyRule {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub effect: Effect,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionGroup>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<Advice>,
}

/// Glob pre-filters deciding whether a policy is considered at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyTarget {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tenants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub inheritable: bool,
    #[serde(default)]
    pub delegatable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub version: i32,
    pub rules: Vec<PolicyRule>,
    pub targets: PolicyTarget,
    pub enabled: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Uuid>,
    pub metadata: PolicyMetadata,
}

impl Default for Policy {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            name: String::new(),
            description: String::new(),
            version: 0,
            rules: Vec::new(),
            targets: PolicyTarget::default(),
            enabled: false,
            priority: 0,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
            metadata: PolicyMetadata::default(),
        }
    }
}

impl Policy {
    /// Gives the policy and every rule without an id a fresh identifier.
    pub fn assign_missing_identifiers(&mut self) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        for rule in &mut self.rules {
            if rule.id.is_empty() {
                rule.id = Uuid::new_v4().to_string();
            }
        }
    }

    /// Replaces every rule id, as done when a policy is copied.
    pub fn regenerate_rule_identifiers(&mut self) {
        for rule in &mut self.rules {
            rule.id = Uuid::new_v4().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidPolicy("name is required".to_string()));
        }
        if self.name.chars().count() > MAX_POLICY_NAME_LEN {
            return Err(AppError::InvalidPolicy(format!(
                "name must be at most {} characters",
                MAX_POLICY_NAME_LEN
            )));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !rule.id.is_empty() && !seen.insert(rule.id.as_str()) {
                return Err(AppError::InvalidPolicy(format!(
                    "duplicate rule id: {}",
                    rule.id
                )));
            }
            if rule.actions.is_empty() {
                return Err(AppError::InvalidPolicy(format!(
                    "rule {} must declare at least one action",
                    rule.id
                )));
            }
            if rule.resources.is_empty() {
                return Err(AppError::InvalidPolicy(format!(
                    "rule {} must declare at least one resource",
                    rule.id
                )));
            }
            if let Some(group) = &rule.conditions {
                group.validate()?;
            }
        }
        Ok(())
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Engine-level strategy for merging the decisions of several policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombiningAlgorithm {
    #[default]
    DenyOverrides,
    PermitOverrides,
    FirstApplicable,
    OnlyOneApplicable,
    HighestPriority,
}

impl CombiningAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombiningAlgorithm::DenyOverrides => "deny_overrides",
            CombiningAlgorithm::PermitOverrides => "permit_overrides",
            CombiningAlgorithm::FirstApplicable => "first_applicable",
            CombiningAlgorithm::OnlyOneApplicable => "only_one_applicable",
            CombiningAlgorithm::HighestPriority => "highest_priority",
        }
    }
}

impl fmt::Display for CombiningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombiningAlgorithm {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "deny_overrides" => Ok(CombiningAlgorithm::DenyOverrides),
            "permit_overrides" => Ok(CombiningAlgorithm::PermitOverrides),
            "first_applicable" => Ok(CombiningAlgorithm::FirstApplicable),
            "only_one_applicable" => Ok(CombiningAlgorithm::OnlyOneApplicable),
            "highest_priority" => Ok(CombiningAlgorithm::HighestPriority),
            other => Err(AppError::Config(format!(
                "unknown combining algorithm: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicySortField {
    Name,
    Priority,
    #[default]
    CreatedAt,
    UpdatedAt,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Query over stored policies. A `limit` of 0 returns everything after
/// `offset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyFilter {
    pub tenant_id: Option<Uuid>,
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub tags: Vec<String>,
    pub offset: usize,
    pub limit: usize,
    pub sort_by: Option<PolicySortField>,
    pub sort_order: SortOrder,
}
