//! CRM IAM ABAC - attribute-based access control for the multi-tenant CRM
//!
//! Policy model, policy store, attribute enrichment, the evaluation engine and
//! the HTTP surface (management API plus enforcement middleware) built on it.

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod policy;
pub mod repository;
pub mod server;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use policy::{DecisionChecker, EngineConfig, PolicyEngine};
