//! HTTP middleware for the ABAC service
//!
//! - Tenant/actor extraction from request headers
//! - Policy enforcement in front of protected routes
//! - Request ID propagation and HTTP metrics

pub mod enforce;
pub mod metrics;
pub mod tenant;

pub use enforce::{enforce_middleware, EnforcementState};
pub use metrics::ObservabilityLayer;
pub use tenant::TenantContext;
