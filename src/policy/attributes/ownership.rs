//! Resource ownership, sharing and tenancy attributes.

use super::{record_failure, AttributeBags, AttributeProvider};
use crate::cache::{ttl, TtlCache};
use crate::domain::{AttributeMap, AttributeSource, AttributeValue, EvaluationRequest};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceOwnershipStore: Send + Sync {
    async fn get_owner(&self, resource_type: &str, resource_id: Uuid) -> Result<Option<Uuid>>;
    async fn get_shared_with(&self, resource_type: &str, resource_id: Uuid) -> Result<Vec<Uuid>>;
    async fn get_resource_tenant(
        &self,
        resource_type: &str,
        resource_id: Uuid,
    ) -> Result<Option<Uuid>>;
}

/// What the store knows about a resource, independent of who is asking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceFacts {
    pub owner_id: Option<Uuid>,
    pub shared_with: Option<Vec<Uuid>>,
    pub tenant_id: Option<Uuid>,
}

impl ResourceFacts {
    /// Attributes for one request. Relationship flags are derived from the
    /// request's own subject and tenant.
    pub fn attributes_for(&self, request: &EvaluationRequest) -> AttributeMap {
        let subject = request.subject_id();
        let mut attrs = AttributeMap::new();

        if let Some(owner) = self.owner_id {
            attrs.insert("owner_id".into(), owner.into());
            if let Some(subject) = subject {
                attrs.insert("is_owner".into(), (owner.to_string() == subject).into());
            }
        }

        if let Some(shared) = &self.shared_with {
            let ids: Vec<String> = shared.iter().map(Uuid::to_string).collect();
            if let Some(subject) = subject {
                attrs.insert(
                    "is_shared_with_me".into(),
                    ids.iter().any(|id| id == subject).into(),
                );
            }
            attrs.insert("shared_with".into(), AttributeValue::from(ids));
        }

        if let Some(tenant) = self.tenant_id {
            attrs.insert("resource_tenant_id".into(), tenant.into());
            attrs.insert("same_tenant".into(), (tenant == request.tenant_id).into());
        }

        attrs
    }
}

pub struct ResourceOwnershipProvider {
    name: String,
    store: Arc<dyn ResourceOwnershipStore>,
    cache: TtlCache<(String, Uuid), ResourceFacts>,
    span: Span,
}

impl ResourceOwnershipProvider {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn ResourceOwnershipStore>,
        cache_ttl: Option<Duration>,
        span: Span,
    ) -> Self {
        let ttl = cache_ttl.unwrap_or(Duration::from_secs(ttl::RESOURCE_SECS));
        Self {
            name: name.into(),
            store,
            cache: TtlCache::new("resource_ownership", ttl),
            span,
        }
    }

    pub async fn invalidate(&self, resource_type: &str, resource_id: Uuid) {
        self.cache
            .invalidate(&(resource_type.to_string(), resource_id))
            .await;
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }

    async fn load(&self, resource_type: &str, resource_id: Uuid) -> (ResourceFacts, bool) {
        let mut facts = ResourceFacts::default();
        let mut complete = true;

        match self.store.get_owner(resource_type, resource_id).await {
            Ok(owner) => facts.owner_id = owner,
            Err(e) => {
                complete = false;
                record_failure(&self.span, &self.name, &e);
            }
        }

        match self.store.get_shared_with(resource_type, resource_id).await {
            Ok(shared) => facts.shared_with = Some(shared),
            Err(e) => {
                complete = false;
                record_failure(&self.span, &self.name, &e);
            }
        }

        match self
            .store
            .get_resource_tenant(resource_type, resource_id)
            .await
        {
            Ok(tenant) => facts.tenant_id = tenant,
            Err(e) => {
                complete = false;
                record_failure(&self.span, &self.name, &e);
            }
        }

        (facts, complete)
    }
}

#[async_trait]
impl AttributeProvider for ResourceOwnershipProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_attributes(&self, request: &EvaluationRequest) -> Result<AttributeBags> {
        let mut bags = AttributeBags::new();
        let resource_type = request.resource_type();
        let Some(resource_id) = request.resource_id().and_then(|id| Uuid::parse_str(id).ok())
        else {
            return Ok(bags);
        };
        if resource_type.is_empty() {
            return Ok(bags);
        }

        let key = (resource_type.to_string(), resource_id);
        let facts = match self.cache.get(&key).await {
            Some(facts) => facts,
            None => {
                let (facts, complete) = self.load(resource_type, resource_id).await;
                if complete {
                    self.cache.insert(key, facts.clone()).await;
                }
                facts
            }
        };

        bags.insert(AttributeSource::Resource, facts.attributes_for(request));
        Ok(bags)
    }
}
