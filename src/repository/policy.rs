//! Policy repository.

use crate::domain::{Policy, PolicyFilter, PolicySortField, SortOrder};
use crate::error::{AppError, Result};
use crate::policy::target;
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable storage for policies.
///
/// Lookups of a missing policy fail with [`AppError::PolicyNotFound`];
/// `create`/`update` reject a name already used within the tenant with
/// [`AppError::DuplicatePolicy`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn create(&self, policy: Policy) -> Result<Policy>;
    async fn update(&self, policy: Policy) -> Result<Policy>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Policy>;
    async fn find_by_tenant_id(&self, tenant_id: Uuid) -> Result<Vec<Policy>>;
    async fn find_by_name(&self, tenant_id: Uuid, name: &str) -> Result<Policy>;
    /// Enabled policies whose targets and rules cover `resource`/`action`.
    async fn find_applicable(
        &self,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<Vec<Policy>>;
    /// Filtered page plus the number of matches before paging.
    async fn list(&self, filter: &PolicyFilter) -> Result<(Vec<Policy>, usize)>;
}

#[derive(Default)]
struct Indexes {
    policies: HashMap<Uuid, Policy>,
    by_tenant: HashMap<Uuid, Vec<Uuid>>,
    by_name: HashMap<(Uuid, String), Uuid>,
}

impl Indexes {
    fn tenant_policies(&self, tenant_id: Uuid) -> impl Iterator<Item = &Policy> {
        self.by_tenant
            .get(&tenant_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.policies.get(id))
    }
}

/// Reference store keeping everything in memory behind one lock.
#[derive(Default)]
pub struct InMemoryPolicyRepository {
    inner: RwLock<Indexes>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::PolicyNotFound(id.to_string())
}

fn compare_by(field: PolicySortField, a: &Policy, b: &Policy) -> Ordering {
    match field {
        PolicySortField::Name => a.name.cmp(&b.name),
        PolicySortField::Priority => a.priority.cmp(&b.priority),
        PolicySortField::CreatedAt => a.created_at.cmp(&b.created_at),
        PolicySortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        PolicySortField::Version => a.version.cmp(&b.version),
    }
}

#[async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn create(&self, mut policy: Policy) -> Result<Policy> {
        policy.assign_missing_identifiers();
        policy.validate()?;

        let mut inner = self.inner.write().await;
        if inner.policies.contains_key(&policy.id) {
            return Err(AppError::DuplicatePolicy(format!(
                "policy already exists: {}",
                policy.id
            )));
        }
        let name_key = (policy.tenant_id, policy.name.clone());
        if inner.by_name.contains_key(&name_key) {
            return Err(AppError::DuplicatePolicy(format!(
                "policy with name already exists: {}",
                policy.name
            )));
        }

        let now = Utc::now();
        policy.created_at = now;
        policy.updated_at = now;
        policy.version = 1;

        inner
            .by_tenant
            .entry(policy.tenant_id)
            .or_default()
            .push(policy.id);
        inner.by_name.insert(name_key, policy.id);
        inner.policies.insert(policy.id, policy.clone());

        Ok(policy)
    }

    async fn update(&self, mut policy: Policy) -> Result<Policy> {
        policy.assign_missing_identifiers();
        policy.validate()?;

        let mut inner = self.inner.write().await;
        let existing = inner
            .policies
            .get(&policy.id)
            .cloned()
            .ok_or_else(|| not_found(policy.id))?;

        let old_key = (existing.tenant_id, existing.name.clone());
        let new_key = (existing.tenant_id, policy.name.clone());
        if old_key != new_key {
            if inner.by_name.contains_key(&new_key) {
                return Err(AppError::DuplicatePolicy(format!(
                    "policy with name already exists: {}",
                    policy.name
                )));
            }
            inner.by_name.remove(&old_key);
            inner.by_name.insert(new_key, policy.id);
        }

        policy.tenant_id = existing.tenant_id;
        policy.created_at = existing.created_at;
        policy.created_by = existing.created_by;
        policy.version = existing.version + 1;
        policy.updated_at = Utc::now();

        inner.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let removed = inner.policies.remove(&id).ok_or_else(|| not_found(id))?;

        if let Some(ids) = inner.by_tenant.get_mut(&removed.tenant_id) {
            ids.retain(|existing| *existing != id);
            if ids.is_empty() {
                inner.by_tenant.remove(&removed.tenant_id);
            }
        }
        inner.by_name.remove(&(removed.tenant_id, removed.name));
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Policy> {
        self.inner
            .read()
            .await
            .policies
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn find_by_tenant_id(&self, tenant_id: Uuid) -> Result<Vec<Policy>> {
        let inner = self.inner.read().await;
        Ok(inner.tenant_policies(tenant_id).cloned().collect())
    }

    async fn find_by_name(&self, tenant_id: Uuid, name: &str) -> Result<Policy> {
        let inner = self.inner.read().await;
        inner
            .by_name
            .get(&(tenant_id, name.to_string()))
            .and_then(|id| inner.policies.get(id))
            .cloned()
            .ok_or_else(|| AppError::PolicyNotFound(name.to_string()))
    }

    async fn find_applicable(
        &self,
        tenant_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<Vec<Policy>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tenant_policies(tenant_id)
            .filter(|policy| target::applies_to(policy, resource, action))
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &PolicyFilter) -> Result<(Vec<Policy>, usize)> {
        let inner = self.inner.read().await;

        let mut matched: Vec<&Policy> = inner
            .policies
            .values()
            .filter(|p| filter.tenant_id.is_none_or(|t| p.tenant_id == t))
            .filter(|p| filter.name.as_ref().is_none_or(|n| &p.name == n))
            .filter(|p| filter.enabled.is_none_or(|e| p.enabled == e))
            .filter(|p| {
                filter
                    .tags
                    .iter()
                    .all(|tag| p.metadata.tags.iter().any(|t| t == tag))
            })
            .collect();

        let field = filter.sort_by.unwrap_or_default();
        matched.sort_by(|a, b| {
            let primary = match filter.sort_order {
                SortOrder::Asc => compare_by(field, a, b),
                SortOrder::Desc => compare_by(field, b, a),
            };
            primary
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matched.len();
        let take = if filter.limit == 0 {
            usize::MAX
        } else {
            filter.limit
        };
        let page = matched
            .into_iter()
            .skip(filter.offset)
            .take(take)
            .cloned()
            .collect();

        Ok((page, total))
    }
}
