//! Data access layer (Repository pattern)

pub mod policy;

pub use policy::{InMemoryPolicyRepository, PolicyRepository};

#[cfg(test)]
pub use policy::MockPolicyRepository;
