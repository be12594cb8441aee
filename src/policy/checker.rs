//! Boolean access checks on top of the engine.

use super::engine::PolicyEngine;
use crate::domain::{Decision, EvaluationRequest};
use crate::error::Result;
use std::sync::Arc;
use uuid::Uuid;

/// Answers "may this subject do X" questions. Only `allow` counts as yes.
#[derive(Clone)]
pub struct DecisionChecker {
    engine: Arc<PolicyEngine>,
}

impl DecisionChecker {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    fn request(
        tenant_id: Uuid,
        subject_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: Option<Uuid>,
    ) -> EvaluationRequest {
        let mut request = EvaluationRequest::new(tenant_id)
            .with_subject("id", subject_id)
            .with_resource("type", resource_type)
            .with_action("name", action);
        if let Some(id) = resource_id {
            request = request.with_resource("id", id);
        }
        request
    }

    pub async fn can_perform(
        &self,
        tenant_id: Uuid,
        subject_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: Option<Uuid>,
    ) -> Result<bool> {
        let request = Self::request(tenant_id, subject_id, action, resource_type, resource_id);
        let result = self.engine.evaluate(&request).await?;
        Ok(result.decision == Decision::Allow)
    }

    /// Keeps the resource ids the subject may act on, in input order.
    pub async fn filter_allowed(
        &self,
        tenant_id: Uuid,
        subject_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_ids: &[Uuid],
    ) -> Result<Vec<Uuid>> {
        let mut allowed = Vec::with_capacity(resource_ids.len());
        for id in resource_ids {
            if self
                .can_perform(tenant_id, subject_id, action, resource_type, Some(*id))
                .await?
            {
                allowed.push(*id);
            }
        }
        Ok(allowed)
    }
}
