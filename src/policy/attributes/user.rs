//! Subject profile, role and tenant attributes.

use super::{record_failure, AttributeBags, AttributeProvider};
use crate::cache::{ttl, TtlCache};
use crate::domain::{AttributeMap, AttributeSource, AttributeValue, EvaluationRequest};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct UserData {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub name: String,
    pub department: String,
    pub title: String,
    pub level: i64,
    pub attributes: AttributeMap,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleData {
    pub id: Uuid,
    pub name: String,
    pub level: i64,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TenantData {
    pub id: Uuid,
    pub name: String,
    pub plan: String,
    pub features: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserData>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<RoleData>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantData>>;
}

/// Looks up the request subject in the user, role and tenant stores.
///
/// Results are cached per `(tenant, subject)`; a lookup where any store
/// failed is returned but not cached.
pub struct UserAttributeProvider {
    name: String,
    users: Option<Arc<dyn UserStore>>,
    roles: Option<Arc<dyn RoleStore>>,
    tenants: Option<Arc<dyn TenantStore>>,
    cache: TtlCache<(Uuid, Uuid), AttributeMap>,
    span: Span,
}

impl UserAttributeProvider {
    pub fn new(name: impl Into<String>, cache_ttl: Option<Duration>, span: Span) -> Self {
        let ttl = cache_ttl.unwrap_or(Duration::from_secs(ttl::USER_SECS));
        Self {
            name: name.into(),
            users: None,
            roles: None,
            tenants: None,
            cache: TtlCache::new("user_attributes", ttl),
            span,
        }
    }

    pub fn with_user_store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.users = Some(store);
        self
    }

    pub fn with_role_store(mut self, store: Arc<dyn RoleStore>) -> Self {
        self.roles = Some(store);
        self
    }

    pub fn with_tenant_store(mut self, store: Arc<dyn TenantStore>) -> Self {
        self.tenants = Some(store);
        self
    }

    pub async fn invalidate(&self, tenant_id: Uuid, subject_id: Uuid) {
        self.cache.invalidate(&(tenant_id, subject_id)).await;
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }

    /// Returns the attributes and whether every lookup succeeded.
    async fn load(&self, tenant_id: Uuid, subject_id: Uuid) -> (AttributeMap, bool) {
        let mut attrs = AttributeMap::new();
        let mut complete = true;

        if let Some(users) = &self.users {
            match users.get_user(subject_id).await {
                Ok(Some(user)) => {
                    attrs.insert("email".into(), user.email.into());
                    attrs.insert("name".into(), user.name.into());
                    attrs.insert("department".into(), user.department.into());
                    attrs.insert("title".into(), user.title.into());
                    attrs.insert("level".into(), user.level.into());
                    attrs.insert("is_active".into(), user.is_active.into());
                    attrs.insert("created_at".into(), user.created_at.to_rfc3339().into());
                    attrs.extend(user.attributes);
                }
                Ok(None) => {}
                Err(e) => {
                    complete = false;
                    record_failure(&self.span, &self.name, &e);
                }
            }
        }

        if let Some(roles) = &self.roles {
            match roles.get_user_roles(subject_id).await {
                Ok(roles) => {
                    let mut seen = HashSet::new();
                    let permissions: Vec<AttributeValue> = roles
                        .iter()
                        .flat_map(|role| role.permissions.iter())
                        .filter(|p| seen.insert(p.as_str()))
                        .map(|p| AttributeValue::from(p.as_str()))
                        .collect();
                    let names: Vec<AttributeValue> = roles
                        .iter()
                        .map(|role| AttributeValue::from(role.name.as_str()))
                        .collect();
                    let max_level = roles.iter().map(|role| role.level).max().unwrap_or(0);

                    attrs.insert("roles".into(), AttributeValue::List(names));
                    attrs.insert("permissions".into(), AttributeValue::List(permissions));
                    attrs.insert("max_role_level".into(), max_level.into());
                }
                Err(e) => {
                    complete = false;
                    record_failure(&self.span, &self.name, &e);
                }
            }
        }

        if let Some(tenants) = &self.tenants {
            match tenants.get_tenant(tenant_id).await {
                Ok(Some(tenant)) => {
                    attrs.insert("tenant_name".into(), tenant.name.into());
                    attrs.insert("tenant_plan".into(), tenant.plan.into());
                    attrs.insert("tenant_features".into(), tenant.features.into());
                }
                Ok(None) => {}
                Err(e) => {
                    complete = false;
                    record_failure(&self.span, &self.name, &e);
                }
            }
        }

        (attrs, complete)
    }
}

#[async_trait]
impl AttributeProvider for UserAttributeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_attributes(&self, request: &EvaluationRequest) -> Result<AttributeBags> {
        let mut bags = AttributeBags::new();
        let Some(subject_id) = request.subject_id().and_then(|id| Uuid::parse_str(id).ok()) else {
            return Ok(bags);
        };

        let key = (request.tenant_id, subject_id);
        let attrs = match self.cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let (attrs, complete) = self.load(request.tenant_id, subject_id).await;
                if complete {
                    self.cache.insert(key, attrs.clone()).await;
                }
                attrs
            }
        };

        bags.insert(AttributeSource::Subject, attrs);
        Ok(bags)
    }
}
