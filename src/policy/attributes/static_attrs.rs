use super::{AttributeBags, AttributeProvider};
use crate::domain::{AttributeSource, AttributeValue, EvaluationRequest};
use crate::error::Result;
use async_trait::async_trait;

/// Fixed attributes per source, returned unchanged for every request.
#[derive(Default)]
pub struct StaticAttributeProvider {
    name: String,
    attributes: AttributeBags,
}

impl StaticAttributeProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: AttributeBags::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        source: AttributeSource,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.set_attribute(source, key, value);
        self
    }

    pub fn set_attribute(
        &mut self,
        source: AttributeSource,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) {
        self.attributes
            .entry(source)
            .or_default()
            .insert(key.into(), value.into());
    }
}

#[async_trait]
impl AttributeProvider for StaticAttributeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_attributes(&self, _request: &EvaluationRequest) -> Result<AttributeBags> {
        Ok(self.attributes.clone())
    }
}
