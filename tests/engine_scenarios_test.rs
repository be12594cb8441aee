//! End-to-end engine scenarios over the in-memory store and real providers

use async_trait::async_trait;
use chrono::Utc;
use crm_iam_abac::domain::builder::*;
use crm_iam_abac::domain::{AttributeMap, CombiningAlgorithm, Decision, EvaluationRequest};
use crm_iam_abac::policy::attributes::{
    AttributeBags, AttributeProvider, StaticAttributeProvider, UserAttributeProvider, UserData,
    UserStore,
};
use crm_iam_abac::repository::{InMemoryPolicyRepository, PolicyRepository};
use crm_iam_abac::{AppError, DecisionChecker, EngineConfig, PolicyEngine, Result};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Span;
use uuid::Uuid;

/// Users keyed by id.
struct Directory {
    users: HashMap<Uuid, UserData>,
}

impl Directory {
    fn with(users: impl IntoIterator<Item = (Uuid, Uuid, &'static str)>) -> Self {
        let users = users
            .into_iter()
            .map(|(id, tenant_id, department)| {
                (
                    id,
                    UserData {
                        id,
                        tenant_id,
                        email: format!("{id}@crm.test"),
                        name: "Test User".to_string(),
                        department: department.to_string(),
                        title: "Rep".to_string(),
                        level: 2,
                        attributes: AttributeMap::new(),
                        created_at: Utc::now(),
                        is_active: true,
                    },
                )
            })
            .collect();
        Self { users }
    }
}

#[async_trait]
impl UserStore for Directory {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserData>> {
        Ok(self.users.get(&user_id).cloned())
    }
}

struct Unreachable;

#[async_trait]
impl AttributeProvider for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn get_attributes(&self, _request: &EvaluationRequest) -> Result<AttributeBags> {
        Err(AppError::provider("unreachable", "connection refused"))
    }
}

/// P1 allows reading customers; P2 denies it to suspended subjects.
async fn seed_customer_policies(repo: &InMemoryPolicyRepository, tenant: Uuid) {
    repo.create(
        PolicyBuilder::new(tenant, "P1")
            .with_priority(10)
            .add_rule(
                RuleBuilder::allow()
                    .with_id("R1")
                    .with_actions(["read"])
                    .with_resources(["customers"])
                    .build(),
            )
            .build(),
    )
    .await
    .unwrap();

    repo.create(
        PolicyBuilder::new(tenant, "P2")
            .with_priority(5)
            .add_rule(
                RuleBuilder::deny()
                    .with_id("R2")
                    .with_actions(["read"])
                    .with_resources(["customers"])
                    .with_conditions(and([equals(subject_attr("department"), "suspended")]))
                    .build(),
            )
            .build(),
    )
    .await
    .unwrap();
}

fn read_customers(tenant: Uuid, subject: Uuid) -> EvaluationRequest {
    EvaluationRequest::new(tenant)
        .with_subject("id", subject)
        .with_resource("type", "customers")
        .with_action("name", "read")
}

#[tokio::test]
async fn test_department_from_user_store_decides() {
    let tenant = Uuid::new_v4();
    let (sales, suspended) = (Uuid::new_v4(), Uuid::new_v4());

    let repo = Arc::new(InMemoryPolicyRepository::new());
    seed_customer_policies(&repo, tenant).await;

    let engine = PolicyEngine::new(
        repo,
        EngineConfig {
            algorithm: CombiningAlgorithm::DenyOverrides,
            ..Default::default()
        },
    );
    let users = Directory::with([(sales, tenant, "sales"), (suspended, tenant, "suspended")]);
    engine.register_attribute_provider(Arc::new(
        UserAttributeProvider::new("user", None, Span::none()).with_user_store(Arc::new(users)),
    ));

    let result = engine.evaluate(&read_customers(tenant, sales)).await.unwrap();
    assert_eq!(result.decision, Decision::Allow);
    assert_eq!(result.rule_id.as_deref(), Some("R1"));

    let result = engine
        .evaluate(&read_customers(tenant, suspended))
        .await
        .unwrap();
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(result.rule_id.as_deref(), Some("R2"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_failing_provider_still_yields_decision() {
    let tenant = Uuid::new_v4();
    let repo = Arc::new(InMemoryPolicyRepository::new());
    seed_customer_policies(&repo, tenant).await;

    let engine = PolicyEngine::new(repo, EngineConfig::default());
    engine.register_attribute_provider(Arc::new(Unreachable));
    engine.register_attribute_provider(Arc::new(
        StaticAttributeProvider::new("static").with_attribute(
            crm_iam_abac::domain::AttributeSource::Subject,
            "department",
            "sales",
        ),
    ));

    let result = engine
        .evaluate(&read_customers(tenant, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(result.decision, Decision::Allow);
}

#[tokio::test]
async fn test_invalidate_cache_rereads_store() {
    let tenant = Uuid::new_v4();
    let repo = Arc::new(InMemoryPolicyRepository::new());
    let engine = PolicyEngine::new(repo.clone(), EngineConfig::default());
    let request = read_customers(tenant, Uuid::new_v4());

    let result = engine.evaluate(&request).await.unwrap();
    assert_eq!(result.decision, Decision::NotApplicable);

    seed_customer_policies(&repo, tenant).await;

    // Still served from the cached empty list.
    let result = engine.evaluate(&request).await.unwrap();
    assert_eq!(result.decision, Decision::NotApplicable);

    engine.invalidate_cache(tenant).await;
    let result = engine.evaluate(&request).await.unwrap();
    assert_eq!(result.decision, Decision::Allow);
}

#[tokio::test]
async fn test_only_one_applicable_with_two_definitive_policies() {
    let tenant = Uuid::new_v4();
    let repo = Arc::new(InMemoryPolicyRepository::new());
    seed_customer_policies(&repo, tenant).await;
    repo.create(
        PolicyBuilder::new(tenant, "P3")
            .add_rule(
                RuleBuilder::allow()
                    .with_actions(["*"])
                    .with_resources(["customers"])
                    .build(),
            )
            .build(),
    )
    .await
    .unwrap();

    let engine = PolicyEngine::new(
        repo,
        EngineConfig {
            algorithm: CombiningAlgorithm::OnlyOneApplicable,
            ..Default::default()
        },
    );
    let result = engine
        .evaluate(&read_customers(tenant, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(result.decision, Decision::Indeterminate);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let (tenant, other) = (Uuid::new_v4(), Uuid::new_v4());
    let repo = Arc::new(InMemoryPolicyRepository::new());
    seed_customer_policies(&repo, tenant).await;

    let checker = DecisionChecker::new(Arc::new(PolicyEngine::new(
        repo,
        EngineConfig::default(),
    )));
    let subject = Uuid::new_v4();

    assert!(checker
        .can_perform(tenant, subject, "read", "customers", None)
        .await
        .unwrap());
    assert!(!checker
        .can_perform(other, subject, "read", "customers", None)
        .await
        .unwrap());
}
