//! Attribute providers enrich an evaluation request before policies run.
//!
//! Every provider returns a partial set of attribute bags keyed by source.
//! Bags from later providers overwrite keys from earlier ones.

pub mod environment;
pub mod hierarchy;
pub mod ownership;
pub mod request_context;
pub mod static_attrs;
pub mod user;

pub use environment::{EnvironmentConfig, EnvironmentProvider};
pub use hierarchy::{HierarchyFacts, HierarchyProvider, HierarchyStore};
pub use ownership::{ResourceFacts, ResourceOwnershipProvider, ResourceOwnershipStore};
pub use request_context::RequestContextProvider;
pub use static_attrs::StaticAttributeProvider;
pub use user::{RoleData, RoleStore, TenantData, TenantStore, UserAttributeProvider, UserData, UserStore};

use crate::domain::{AttributeMap, AttributeSource, EvaluationRequest};
use crate::error::Result;
use async_trait::async_trait;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Span;

/// Attributes grouped by the source they belong to.
pub type AttributeBags = HashMap<AttributeSource, AttributeMap>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttributeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_attributes(&self, request: &EvaluationRequest) -> Result<AttributeBags>;
}

/// Merges `incoming` into `target`, overwriting existing keys.
pub fn merge_bags(target: &mut AttributeBags, incoming: AttributeBags) {
    for (source, attrs) in incoming {
        target.entry(source).or_default().extend(attrs);
    }
}

/// Writes every bag into the matching section of `request`.
pub fn apply_bags(request: &mut EvaluationRequest, bags: AttributeBags) {
    for (source, attrs) in bags {
        request.bag_mut(source).extend(attrs);
    }
}

pub(crate) fn record_failure(span: &Span, provider: &str, error: &dyn std::fmt::Display) {
    counter!("abac_attribute_provider_failures_total", "provider" => provider.to_string())
        .increment(1);
    tracing::warn!(parent: span, provider = %provider, error = %error, "Attribute provider failed");
}

/// Runs a list of providers in order and merges what they return.
///
/// A failing provider is logged and skipped; the composite itself never fails.
pub struct CompositeAttributeProvider {
    name: String,
    providers: Vec<Arc<dyn AttributeProvider>>,
    span: Span,
}

impl CompositeAttributeProvider {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
            span,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn AttributeProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn add_provider(&mut self, provider: Arc<dyn AttributeProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl AttributeProvider for CompositeAttributeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_attributes(&self, request: &EvaluationRequest) -> Result<AttributeBags> {
        let mut merged: AttributeBags = AttributeSource::ALL
            .iter()
            .map(|source| (*source, AttributeMap::new()))
            .collect();

        for provider in &self.providers {
            match provider.get_attributes(request).await {
                Ok(bags) => merge_bags(&mut merged, bags),
                Err(e) => record_failure(&self.span, provider.name(), &e),
            }
        }

        Ok(merged)
    }
}
