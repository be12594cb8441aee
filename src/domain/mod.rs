//! Domain models for the ABAC engine

pub mod attribute;
pub mod builder;
pub mod evaluation;
pub mod operand;
pub mod policy;

pub use attribute::{AttributeMap, AttributeSource, AttributeValue};
pub use evaluation::{
    Decision, EvaluationRequest, EvaluationResult, EvaluationTrace, PolicyTrace, RuleTrace,
};
pub use policy::{
    Advice, AttributeReference, CombiningAlgorithm, Condition, ConditionGroup, ConditionOperator,
    Effect, LogicalOperator, Obligation, Policy, PolicyFilter, PolicyMetadata, PolicyRule,
    PolicySortField, PolicyTarget, SortOrder,
};
