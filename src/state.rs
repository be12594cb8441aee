//! Application state traits for dependency injection
//!
//! Handlers are generic over [`HasPolicyEngine`] so the production
//! `AppState` and test states share the same handler code.

use crate::policy::PolicyEngine;
use crate::repository::PolicyRepository;
use std::sync::Arc;

/// State that provides the policy store and the engine evaluating it.
pub trait HasPolicyEngine: Clone + Send + Sync + 'static {
    /// Store used by the management endpoints
    fn policy_repo(&self) -> &Arc<dyn PolicyRepository>;

    /// Engine whose cache is invalidated after every mutation
    fn policy_engine(&self) -> &Arc<PolicyEngine>;
}
