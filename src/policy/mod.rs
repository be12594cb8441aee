//! ABAC policy evaluation

pub mod attributes;
pub mod checker;
pub mod combining;
pub mod condition;
pub mod engine;
pub mod pattern;
pub mod target;

pub use checker::DecisionChecker;
pub use engine::{EngineConfig, PolicyEngine};
pub use pattern::match_pattern;
