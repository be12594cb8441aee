//! ABAC policy management and evaluation API handlers

use crate::api::{MessageResponse, SuccessResponse};
use crate::domain::{
    AttributeMap, CombiningAlgorithm, EvaluationRequest, Policy, PolicyFilter, PolicyMetadata,
    PolicyRule, PolicySortField, PolicyTarget, SortOrder,
};
use crate::error::{AppError, Result};
use crate::middleware::TenantContext;
use crate::policy::{EngineConfig, PolicyEngine};
use crate::repository::{InMemoryPolicyRepository, PolicyRepository};
use crate::state::HasPolicyEngine;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub(crate) const DEFAULT_LIST_LIMIT: usize = 50;
pub(crate) const MAX_BATCH_SIZE: usize = 100;
pub(crate) const EXPORT_FORMAT_VERSION: &str = "1.0";

// ==================== Inputs ====================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePolicyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, message = "at least one rule is required"))]
    pub rules: Vec<PolicyRule>,
    #[serde(default)]
    pub targets: PolicyTarget,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: PolicyMetadata,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePolicyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "at least one rule is required"))]
    pub rules: Option<Vec<PolicyRule>>,
    pub targets: Option<PolicyTarget>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
    pub metadata: Option<PolicyMetadata>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClonePolicyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPoliciesQuery {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    /// Comma separated
    pub tags: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
    pub sort_by: Option<PolicySortField>,
    pub sort_order: Option<SortOrder>,
}

impl ListPoliciesQuery {
    fn into_filter(self, tenant_id: Uuid) -> PolicyFilter {
        PolicyFilter {
            tenant_id: Some(tenant_id),
            name: self.name.filter(|n| !n.is_empty()),
            enabled: self.enabled,
            tags: self
                .tags
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            offset: self.offset,
            limit: self.limit.unwrap_or(DEFAULT_LIST_LIMIT),
            sort_by: self.sort_by,
            sort_order: self.sort_order.unwrap_or_default(),
        }
    }
}

/// Attribute bags of an evaluation; the tenant always comes from the header.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvaluateInput {
    pub subject: AttributeMap,
    pub resource: AttributeMap,
    pub action: AttributeMap,
    pub environment: AttributeMap,
    pub context: AttributeMap,
}

impl EvaluateInput {
    fn into_request(self, tenant_id: Uuid) -> EvaluationRequest {
        EvaluationRequest {
            tenant_id,
            subject: self.subject,
            resource: self.resource,
            action: self.action,
            environment: self.environment,
            context: self.context,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestPolicyInput {
    pub policy: Policy,
    #[serde(default)]
    pub request: EvaluateInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportInput {
    #[serde(default)]
    pub policies: Vec<Policy>,
}

// ==================== Outputs ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyListResponse {
    pub policies: Vec<Policy>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub tenant_id: Uuid,
    pub policies: Vec<Policy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResponse {
    pub success: bool,
    pub imported: usize,
    pub errors: Vec<String>,
}

// ==================== Helpers ====================

/// Loads a policy, hiding policies of other tenants behind a 404.
async fn load_owned<S: HasPolicyEngine>(state: &S, tenant_id: Uuid, id: Uuid) -> Result<Policy> {
    let policy = state.policy_repo().find_by_id(id).await?;
    if policy.tenant_id != tenant_id {
        return Err(AppError::PolicyNotFound(id.to_string()));
    }
    Ok(policy)
}

/// Disabled copy of `source` under a new name with fresh identifiers.
fn cloned_policy(source: &Policy, name: String, actor: Option<Uuid>) -> Policy {
    let mut cloned = Policy {
        id: Uuid::new_v4(),
        tenant_id: source.tenant_id,
        name,
        description: format!("{} (cloned)", source.description),
        version: 1,
        rules: source.rules.clone(),
        targets: source.targets.clone(),
        enabled: false,
        priority: source.priority,
        created_by: actor,
        updated_by: None,
        metadata: source.metadata.clone(),
        ..Default::default()
    };
    cloned.regenerate_rule_identifiers();
    cloned
}

/// Rebinds an imported policy to `tenant_id` with fresh identifiers.
fn imported_policy(mut policy: Policy, tenant_id: Uuid, actor: Option<Uuid>) -> Policy {
    let now = Utc::now();
    policy.id = Uuid::new_v4();
    policy.tenant_id = tenant_id;
    policy.version = 1;
    policy.created_at = now;
    policy.updated_at = now;
    policy.created_by = actor;
    policy.updated_by = None;
    policy.regenerate_rule_identifiers();
    policy
}

// ==================== Policies ====================

/// Create policy
pub async fn create_policy<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Json(input): Json<CreatePolicyInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;

    let policy = Policy {
        id: Uuid::new_v4(),
        tenant_id: tenant.tenant_id,
        name: input.name,
        description: input.description,
        rules: input.rules,
        targets: input.targets,
        priority: input.priority,
        enabled: input.enabled,
        metadata: input.metadata,
        created_by: tenant.user_id,
        ..Default::default()
    };

    let policy = state.policy_repo().create(policy).await?;
    state.policy_engine().invalidate_cache(tenant.tenant_id).await;

    tracing::info!(tenant_id = %tenant.tenant_id, policy_id = %policy.id, name = %policy.name, "Policy created");
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(policy))))
}

/// Get policy by ID
pub async fn get_policy<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let policy = load_owned(&state, tenant.tenant_id, id).await?;
    Ok(Json(SuccessResponse::new(policy)))
}

/// List policies of the tenant
pub async fn list_policies<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Query(query): Query<ListPoliciesQuery>,
) -> Result<impl IntoResponse> {
    let filter = query.into_filter(tenant.tenant_id);
    let (policies, total) = state.policy_repo().list(&filter).await?;
    Ok(Json(SuccessResponse::new(PolicyListResponse {
        policies,
        total,
        offset: filter.offset,
        limit: filter.limit,
    })))
}

/// Update policy
pub async fn update_policy<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePolicyInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let mut policy = load_owned(&state, tenant.tenant_id, id).await?;

    if let Some(name) = input.name {
        policy.name = name;
    }
    if let Some(description) = input.description {
        policy.description = description;
    }
    if let Some(rules) = input.rules {
        policy.rules = rules;
    }
    if let Some(targets) = input.targets {
        policy.targets = targets;
    }
    if let Some(priority) = input.priority {
        policy.priority = priority;
    }
    if let Some(enabled) = input.enabled {
        policy.enabled = enabled;
    }
    if let Some(metadata) = input.metadata {
        policy.metadata = metadata;
    }
    policy.updated_by = tenant.user_id;

    let policy = state.policy_repo().update(policy).await?;
    state.policy_engine().invalidate_cache(tenant.tenant_id).await;

    tracing::info!(tenant_id = %tenant.tenant_id, policy_id = %policy.id, version = policy.version, "Policy updated");
    Ok(Json(SuccessResponse::new(policy)))
}

/// Delete policy
pub async fn delete_policy<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    load_owned(&state, tenant.tenant_id, id).await?;
    state.policy_repo().delete(id).await?;
    state.policy_engine().invalidate_cache(tenant.tenant_id).await;

    tracing::info!(tenant_id = %tenant.tenant_id, policy_id = %id, "Policy deleted");
    Ok(Json(MessageResponse::new("Policy deleted successfully")))
}

/// Clone policy into a disabled copy
pub async fn clone_policy<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(input): Json<ClonePolicyInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let source = load_owned(&state, tenant.tenant_id, id).await?;

    let cloned = cloned_policy(&source, input.name, tenant.user_id);
    let cloned = state.policy_repo().create(cloned).await?;
    state.policy_engine().invalidate_cache(tenant.tenant_id).await;

    Ok((StatusCode::CREATED, Json(SuccessResponse::new(cloned))))
}

// ==================== Evaluation ====================

/// Evaluate one request against the tenant's policies
pub async fn evaluate<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Json(input): Json<EvaluateInput>,
) -> Result<impl IntoResponse> {
    let request = input.into_request(tenant.tenant_id);
    let result = state.policy_engine().evaluate(&request).await?;
    Ok(Json(SuccessResponse::new(result)))
}

/// Evaluate up to 100 requests; a failing item yields `indeterminate`
pub async fn evaluate_batch<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Json(inputs): Json<Vec<EvaluateInput>>,
) -> Result<impl IntoResponse> {
    if inputs.is_empty() {
        return Err(AppError::BadRequest(
            "at least one request is required".to_string(),
        ));
    }
    if inputs.len() > MAX_BATCH_SIZE {
        return Err(AppError::BadRequest(format!(
            "maximum {} requests per batch",
            MAX_BATCH_SIZE
        )));
    }

    let requests: Vec<EvaluationRequest> = inputs
        .into_iter()
        .map(|input| input.into_request(tenant.tenant_id))
        .collect();
    let results = state.policy_engine().evaluate_batch(&requests).await;
    Ok(Json(SuccessResponse::new(results)))
}

/// Evaluate an unsaved policy in isolation, with tracing on
pub async fn test_policy(
    tenant: TenantContext,
    Json(input): Json<TestPolicyInput>,
) -> Result<impl IntoResponse> {
    let mut policy = input.policy;
    policy.id = Uuid::new_v4();
    policy.tenant_id = tenant.tenant_id;
    policy.enabled = true;

    let repository = Arc::new(InMemoryPolicyRepository::new());
    repository.create(policy).await?;

    let engine = PolicyEngine::new(
        repository,
        EngineConfig {
            algorithm: CombiningAlgorithm::DenyOverrides,
            enable_trace: true,
            ..Default::default()
        },
    );
    let outcome = engine
        .evaluate(&input.request.into_request(tenant.tenant_id))
        .await;
    engine.shutdown().await;

    Ok(Json(SuccessResponse::new(outcome?)))
}

// ==================== Import / Export ====================

/// Export every policy of the tenant as a JSON attachment
pub async fn export_policies<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
) -> Result<impl IntoResponse> {
    let policies = state
        .policy_repo()
        .find_by_tenant_id(tenant.tenant_id)
        .await?;

    let export = PolicyExport {
        version: EXPORT_FORMAT_VERSION.to_string(),
        exported_at: Utc::now(),
        tenant_id: tenant.tenant_id,
        policies,
    };

    Ok((
        [(
            header::CONTENT_DISPOSITION,
            "attachment; filename=policies.json",
        )],
        Json(export),
    ))
}

/// Import policies into the tenant; failures are reported per policy
pub async fn import_policies<S: HasPolicyEngine>(
    State(state): State<S>,
    tenant: TenantContext,
    Json(input): Json<ImportInput>,
) -> Result<impl IntoResponse> {
    let mut imported = 0;
    let mut errors = Vec::new();

    for policy in input.policies {
        let policy = imported_policy(policy, tenant.tenant_id, tenant.user_id);
        let name = policy.name.clone();
        match state.policy_repo().create(policy).await {
            Ok(_) => imported += 1,
            Err(e) => errors.push(format!("{}: {}", name, e)),
        }
    }

    state.policy_engine().invalidate_cache(tenant.tenant_id).await;

    tracing::info!(tenant_id = %tenant.tenant_id, imported, failed = errors.len(), "Policies imported");
    Ok(Json(ImportResponse {
        success: errors.is_empty(),
        imported,
        errors,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::builder::*;
    use pretty_assertions::assert_eq;

    fn source() -> Policy {
        let mut policy = PolicyBuilder::new(Uuid::new_v4(), "sales-read")
            .with_description("Sales can read")
            .with_priority(7)
            .add_rule(
                RuleBuilder::allow()
                    .with_id("r1")
                    .with_actions(["read"])
                    .with_resources(["customer"])
                    .build(),
            )
            .build();
        policy.version = 4;
        policy
    }

    #[test]
    fn test_list_query_defaults() {
        let tenant = Uuid::new_v4();
        let filter = ListPoliciesQuery::default().into_filter(tenant);
        assert_eq!(filter.tenant_id, Some(tenant));
        assert_eq!(filter.limit, DEFAULT_LIST_LIMIT);
        assert_eq!(filter.offset, 0);
        assert!(filter.tags.is_empty());
        assert_eq!(filter.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_list_query_tags_are_comma_separated() {
        let query = ListPoliciesQuery {
            tags: Some("sales, ,finance".to_string()),
            limit: Some(0),
            name: Some(String::new()),
            ..Default::default()
        };
        let filter = query.into_filter(Uuid::new_v4());
        assert_eq!(filter.tags, vec!["sales", "finance"]);
        assert_eq!(filter.limit, 0);
        assert_eq!(filter.name, None);
    }

    #[test]
    fn test_list_query_parses_from_url() {
        let uri: axum::http::Uri =
            "/policies?enabled=true&offset=5&limit=10&sort_by=priority&sort_order=desc"
                .parse()
                .unwrap();
        let Query(query) = Query::<ListPoliciesQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(query.enabled, Some(true));
        assert_eq!(query.offset, 5);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.sort_by, Some(PolicySortField::Priority));
        assert_eq!(query.sort_order, Some(SortOrder::Desc));
    }

    #[test]
    fn test_cloned_policy() {
        let source = source();
        let actor = Uuid::new_v4();
        let cloned = cloned_policy(&source, "sales-read-copy".to_string(), Some(actor));

        assert_ne!(cloned.id, source.id);
        assert_eq!(cloned.tenant_id, source.tenant_id);
        assert_eq!(cloned.name, "sales-read-copy");
        assert_eq!(cloned.description, "Sales can read (cloned)");
        assert!(!cloned.enabled);
        assert_eq!(cloned.version, 1);
        assert_eq!(cloned.priority, 7);
        assert_eq!(cloned.created_by, Some(actor));
        assert_eq!(cloned.rules.len(), 1);
        assert_ne!(cloned.rules[0].id, "r1");
        assert_eq!(cloned.rules[0].actions, source.rules[0].actions);
    }

    #[test]
    fn test_imported_policy_is_rebound() {
        let source = source();
        let tenant = Uuid::new_v4();
        let imported = imported_policy(source.clone(), tenant, None);

        assert_ne!(imported.id, source.id);
        assert_eq!(imported.tenant_id, tenant);
        assert_eq!(imported.version, 1);
        assert_eq!(imported.name, source.name);
        assert_ne!(imported.rules[0].id, "r1");
    }

    #[test]
    fn test_create_input_validation() {
        let input: CreatePolicyInput =
            serde_json::from_value(serde_json::json!({ "name": "", "rules": [] })).unwrap();
        let err: AppError = input.validate().unwrap_err().into();
        assert!(matches!(err, AppError::Validation(_)));

        let input: CreatePolicyInput = serde_json::from_value(serde_json::json!({
            "name": "ok",
            "rules": [{ "effect": "allow", "actions": ["read"], "resources": ["deal"] }]
        }))
        .unwrap();
        assert!(input.validate().is_ok());
        assert!(!input.enabled);
    }

    #[test]
    fn test_evaluate_input_uses_header_tenant() {
        let tenant = Uuid::new_v4();
        let input: EvaluateInput = serde_json::from_value(serde_json::json!({
            "subject": { "id": "u1" },
            "resource": { "type": "deal" },
            "action": { "name": "read" }
        }))
        .unwrap();
        let request = input.into_request(tenant);
        assert_eq!(request.tenant_id, tenant);
        assert_eq!(request.resource_type(), "deal");
        assert_eq!(request.action_name(), "read");
        assert!(request.environment.is_empty());
    }
}
