//! Evaluation request/result models.

use super::attribute::{resolve_in, AttributeMap, AttributeSource, AttributeValue};
use super::policy::{Advice, CombiningAlgorithm, Effect, Obligation};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    #[default]
    NotApplicable,
    Indeterminate,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::NotApplicable => "not_applicable",
            Decision::Indeterminate => "indeterminate",
        }
    }

    /// `allow` or `deny`.
    pub fn is_definitive(&self) -> bool {
        matches!(self, Decision::Allow | Decision::Deny)
    }
}

impl From<Effect> for Decision {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Allow => Decision::Allow,
            Effect::Deny => Decision::Deny,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes describing one access attempt, grouped by source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EvaluationRequest {
    pub tenant_id: Uuid,
    pub subject: AttributeMap,
    pub resource: AttributeMap,
    pub action: AttributeMap,
    pub environment: AttributeMap,
    #[serde(skip_serializing_if = "AttributeMap::is_empty")]
    pub context: AttributeMap,
}

impl EvaluationRequest {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            ..Default::default()
        }
    }

    pub fn with_subject(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.subject.insert(key.to_string(), value.into());
        self
    }

    pub fn with_resource(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.resource.insert(key.to_string(), value.into());
        self
    }

    pub fn with_action(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.action.insert(key.to_string(), value.into());
        self
    }

    pub fn with_environment(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.environment.insert(key.to_string(), value.into());
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn bag(&self, source: AttributeSource) -> &AttributeMap {
        match source {
            AttributeSource::Subject => &self.subject,
            AttributeSource::Resource => &self.resource,
            AttributeSource::Action => &self.action,
            AttributeSource::Environment => &self.environment,
            AttributeSource::Context => &self.context,
        }
    }

    pub fn bag_mut(&mut self, source: AttributeSource) -> &mut AttributeMap {
        match source {
            AttributeSource::Subject => &mut self.subject,
            AttributeSource::Resource => &mut self.resource,
            AttributeSource::Action => &mut self.action,
            AttributeSource::Environment => &mut self.environment,
            AttributeSource::Context => &mut self.context,
        }
    }

    /// Looks up an attribute by dot path. Nulls count as missing.
    pub fn attribute(&self, source: AttributeSource, key: &str) -> Option<&AttributeValue> {
        resolve_in(self.bag(source), key)
    }

    pub fn string_attribute(&self, source: AttributeSource, key: &str) -> Option<&str> {
        self.attribute(source, key).and_then(AttributeValue::as_str)
    }

    /// Strict lookup for callers that need the attribute to be present.
    pub fn require_attribute(
        &self,
        source: AttributeSource,
        key: &str,
    ) -> Result<&AttributeValue> {
        self.attribute(source, key)
            .ok_or_else(|| AppError::AttributeNotFound(format!("{}.{}", source, key)))
    }

    pub fn require_str(&self, source: AttributeSource, key: &str) -> Result<&str> {
        self.require_attribute(source, key)?
            .as_str()
            .ok_or_else(|| AppError::InvalidAttributeType(format!("{}.{} is not a string", source, key)))
    }

    pub fn require_number(&self, source: AttributeSource, key: &str) -> Result<f64> {
        self.require_attribute(source, key)?
            .as_f64()
            .ok_or_else(|| AppError::InvalidAttributeType(format!("{}.{} is not numeric", source, key)))
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.string_attribute(AttributeSource::Subject, "id")
    }

    pub fn resource_type(&self) -> &str {
        self.string_attribute(AttributeSource::Resource, "type")
            .unwrap_or_default()
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.string_attribute(AttributeSource::Resource, "id")
    }

    pub fn action_name(&self) -> &str {
        self.string_attribute(AttributeSource::Action, "name")
            .unwrap_or_default()
    }

    /// `subject.role` followed by every string in `subject.roles`.
    pub fn subject_roles(&self) -> Vec<&str> {
        let mut roles = Vec::new();
        if let Some(role) = self.string_attribute(AttributeSource::Subject, "role") {
            roles.push(role);
        }
        if let Some(list) = self
            .attribute(AttributeSource::Subject, "roles")
            .and_then(AttributeValue::as_list)
        {
            roles.extend(list.iter().filter_map(AttributeValue::as_str));
        }
        roles
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTrace {
    pub rule_id: String,
    pub effect: Effect,
    pub decision: Decision,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTrace {
    pub policy_id: Uuid,
    pub policy_name: String,
    pub priority: i32,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleTrace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTrace {
    pub request: EvaluationRequest,
    pub applicable_policies: Vec<PolicyTrace>,
    pub combined_decision: Decision,
    pub algorithm: CombiningAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<Advice>,
    pub evaluated_at: DateTime<Utc>,
    /// Wall-clock evaluation time in microseconds.
    pub evaluation_time_us: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_policies: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<EvaluationTrace>,
}

impl EvaluationResult {
    pub fn new(decision: Decision, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            decision,
            policy_id: None,
            rule_id: None,
            reason: String::new(),
            obligations: Vec::new(),
            advice: Vec::new(),
            evaluated_at,
            evaluation_time_us: 0,
            matched_policies: Vec::new(),
            trace: None,
        }
    }

    /// Result used where evaluation could not run at all.
    pub fn indeterminate(reason: impl Into<String>) -> Self {
        let mut result = Self::new(Decision::Indeterminate, Utc::now());
        result.reason = reason.into();
        result
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}
