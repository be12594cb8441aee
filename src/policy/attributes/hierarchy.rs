//! Organizational hierarchy attributes.

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
pub trait HierarchyStore: Send + Sync {
    async fn get_manager(&self, user_id: Uuid) -> Result<Option<Uuid>>;
    async fn get_subordinates(&self, user_id: Uuid) -> Result<Vec<Uuid>>;
    async fn get_department(&self, user_id: Uuid) -> Result<Option<String>>;
    /// Management chain above the user, nearest manager first.
    async fn get_hierarchy_path(&self, user_id: Uuid) -> Result<Vec<Uuid>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyFacts {
    pub manager_id: Option<Uuid>,
    pub subordinate_ids: Option<Vec<Uuid>>,
    pub department: Option<String>,
    pub path: Option<Vec<Uuid>>,
}

fn id_list(ids: &[Uuid]) -> AttributeValue {
    AttributeValue::List(ids.iter().map(|id| AttributeValue::from(*id)).collect())
}

impl HierarchyFacts {
    fn attributes(&self) -> AttributeMap {
        let mut attrs = AttributeMap::new();
        if let Some(manager) = self.manager_id {
            attrs.insert("manager_id".into(), manager.into());
        }
        if let Some(subordinates) = &self.subordinate_ids {
            attrs.insert("subordinate_ids".into(), id_list(subordinates));
            attrs.insert("is_manager".into(), (!subordinates.is_empty()).into());
        }
        if let Some(department) = &self.department {
            attrs.insert("department".into(), department.as_str().into());
        }
        if let Some(path) = &self.path {
            attrs.insert("hierarchy_path".into(), id_list(path));
            attrs.insert("hierarchy_level".into(), (path.len() as i64).into());
        }
        attrs
    }
}

pub struct HierarchyProvider {
    name: String,
    store: Arc<dyn HierarchyStore>,
    cache: TtlCache<Uuid, HierarchyFacts>,
    span: Span,
}

impl HierarchyProvider {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn HierarchyStore>,
        cache_ttl: Option<Duration>,
        span: Span,
    ) -> Self {
        let ttl = cache_ttl.unwrap_or(Duration::from_secs(ttl::HIERARCHY_SECS));
        Self {
            name: name.into(),
            store,
            cache: TtlCache::new("hierarchy", ttl),
            span,
        }
    }

    pub async fn invalidate(&self, user_id: Uuid) {
        self.cache.invalidate(&user_id).await;
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }

    async fn facts(&self, user_id: Uuid) -> HierarchyFacts {
        if let Some(facts) = self.cache.get(&user_id).await {
            return facts;
        }

        let mut facts = HierarchyFacts::default();
        let mut complete = true;

        match self.store.get_manager(user_id).await {
            Ok(manager) => facts.manager_id = manager,
            Err(e) => {
                complete = false;
                record_failure(&self.span, &self.name, &e);
            }
        }
        match self.store.get_subordinates(user_id).await {
            Ok(subordinates) => facts.subordinate_ids = Some(subordinates),
            Err(e) => {
                complete = false;
                record_failure(&self.span, &self.name, &e);
            }
        }
        match self.store.get_department(user_id).await {
            Ok(department) => facts.department = department,
            Err(e) => {
                complete = false;
                record_failure(&self.span, &self.name, &e);
            }
        }
        match self.store.get_hierarchy_path(user_id).await {
            Ok(path) => facts.path = Some(path),
            Err(e) => {
                complete = false;
                record_failure(&self.span, &self.name, &e);
            }
        }

        if complete {
            self.cache.insert(user_id, facts.clone()).await;
        }
        facts
    }
}

#[async_trait]
impl AttributeProvider for HierarchyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_attributes(&self, request: &EvaluationRequest) -> Result<AttributeBags> {
        let mut bags = AttributeBags::new();
        let Some(subject_id) = request.subject_id().and_then(|id| Uuid::parse_str(id).ok()) else {
            return Ok(bags);
        };

        let mut attrs = self.facts(subject_id).await.attributes();

        let owner = request
            .string_attribute(AttributeSource::Resource, "owner_id")
            .and_then(|id| Uuid::parse_str(id).ok());
        if let Some(owner_id) = owner {
            if let Some(owner_path) = self.facts(owner_id).await.path {
                attrs.insert(
                    "is_manager_of_owner".into(),
                    owner_path.contains(&subject_id).into(),
                );
            }
        }

        bags.insert(AttributeSource::Subject, attrs);
        Ok(bags)
    }
}
