//! Echoes caller-supplied context attributes (client_ip, user_agent, request_id, ...).

use super::{AttributeBags, AttributeProvider};
use crate::domain::{AttributeSource, EvaluationRequest};
use crate::error::Result;
use async_trait::async_trait;

pub struct RequestContextProvider {
    name: String,
}

impl RequestContextProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AttributeProvider for RequestContextProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_attributes(&self, request: &EvaluationRequest) -> Result<AttributeBags> {
        let mut bags = AttributeBags::new();
        bags.insert(AttributeSource::Context, request.context.clone());
        Ok(bags)
    }
}
