//! Policy enforcement middleware
//!
//! Builds an evaluation request from the HTTP request, asks the engine for a
//! decision and either forwards the request or rejects it with 403. In
//! audit-only mode every request is forwarded and denials are only logged.
//! The [`EvaluationResult`] is attached to the request extensions for
//! downstream handlers.

use super::tenant::{client_ip, TenantContext, ROLE_HEADER};
use crate::config::EnforcementConfig;
use crate::domain::{Decision, Effect, EvaluationRequest, EvaluationResult};
use crate::error::AppError;
use crate::policy::PolicyEngine;
use axum::{
    body::Body,
    extract::State,
    http::{header::USER_AGENT, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use std::sync::Arc;

/// Shared state for the enforcement middleware
#[derive(Clone)]
pub struct EnforcementState {
    engine: Arc<PolicyEngine>,
    config: Arc<EnforcementConfig>,
}

impl EnforcementState {
    pub fn new(engine: Arc<PolicyEngine>, config: EnforcementConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }
}

/// HTTP method to action name.
pub fn action_for_method(method: &Method) -> &'static str {
    match *method {
        Method::GET | Method::HEAD | Method::OPTIONS => "read",
        Method::POST => "create",
        Method::PUT | Method::PATCH => "update",
        Method::DELETE => "delete",
        _ => "unknown",
    }
}

/// Resource type, id and sub-resource from the path segments after `prefix`.
pub fn resource_from_path<'a>(
    path: &'a str,
    prefix: &str,
) -> (Option<&'a str>, Option<&'a str>, Option<&'a str>) {
    let trimmed = path.strip_prefix(prefix).unwrap_or(path);
    let mut segments = trimmed.split('/').filter(|s| !s.is_empty());
    (segments.next(), segments.next(), segments.next())
}

/// Skip entries match whole path segments: `/health` covers `/health/live`
/// but not `/healthcheck`.
fn should_skip(path: &str, skip_paths: &[String]) -> bool {
    skip_paths.iter().any(|skip| {
        let skip = skip.trim_end_matches('/');
        path.strip_prefix(skip)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Builds the evaluation request for an HTTP request.
pub fn build_request(
    request: &Request<Body>,
    config: &EnforcementConfig,
) -> Result<EvaluationRequest, AppError> {
    let headers = request.headers();
    let tenant = TenantContext::from_headers(headers)?;
    let path = request.uri().path();
    let method = request.method();

    let mut eval = EvaluationRequest::new(tenant.tenant_id);

    if let Some(user_id) = tenant.user_id {
        eval = eval.with_subject("id", user_id);
    }
    if let Some(role) = headers.get(ROLE_HEADER).and_then(|v| v.to_str().ok()) {
        eval = eval.with_subject("role", role);
    }

    let (resource_type, resource_id, sub_resource) =
        resource_from_path(path, &config.path_prefix);
    if let Some(resource_type) = resource_type {
        eval = eval.with_resource("type", resource_type);
    }
    if let Some(resource_id) = resource_id {
        eval = eval.with_resource("id", resource_id);
    }
    if let Some(sub_resource) = sub_resource {
        eval = eval.with_resource("sub_resource", sub_resource);
    }
    eval = eval
        .with_resource("path", path)
        .with_action("name", action_for_method(method))
        .with_action("method", method.as_str())
        .with_context("http_method", method.as_str())
        .with_context("path", path);

    if let Some(ip) = client_ip(headers) {
        eval = eval.with_context("client_ip", ip);
    }
    if let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        eval = eval.with_context("user_agent", agent);
    }
    if let Some(request_id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        eval = eval.with_context("request_id", request_id);
    }

    Ok(eval)
}

/// Whether a decision lets the request through in enforce mode.
pub fn permits(decision: Decision, default_effect: Effect) -> bool {
    match decision {
        Decision::Allow => true,
        Decision::NotApplicable => default_effect == Effect::Allow,
        Decision::Deny | Decision::Indeterminate => false,
    }
}

fn log_decision(request: &Request<Body>, eval: &EvaluationRequest, result: &EvaluationResult) {
    let subject = eval.subject_id().unwrap_or_default();
    if result.decision == Decision::Allow {
        tracing::debug!(
            decision = %result.decision,
            method = %request.method(),
            path = %request.uri().path(),
            subject_id = subject,
            policy_id = ?result.policy_id,
            rule_id = ?result.rule_id,
            evaluation_time_us = result.evaluation_time_us,
            "ABAC decision"
        );
    } else {
        tracing::warn!(
            decision = %result.decision,
            method = %request.method(),
            path = %request.uri().path(),
            subject_id = subject,
            policy_id = ?result.policy_id,
            rule_id = ?result.rule_id,
            reason = %result.reason,
            "ABAC access not granted"
        );
    }
}

/// Enforcement middleware
pub async fn enforce_middleware(
    State(state): State<EnforcementState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if should_skip(request.uri().path(), &state.config.skip_paths) {
        return next.run(request).await;
    }

    let eval = match build_request(&request, &state.config) {
        Ok(eval) => eval,
        Err(e) => return e.into_response(),
    };

    let result = match state.engine.evaluate(&eval).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "ABAC evaluation failed");
            counter!("abac_enforcement_total", "outcome" => "error").increment(1);
            if state.config.enforce {
                return AppError::EvaluationFailed("authorization error".to_string())
                    .into_response();
            }
            return next.run(request).await;
        }
    };

    log_decision(&request, &eval, &result);

    let permitted = permits(result.decision, state.config.default_effect);
    if !permitted && state.config.enforce {
        counter!("abac_enforcement_total", "outcome" => "denied").increment(1);
        let message = match result.decision {
            Decision::NotApplicable => "access denied - no applicable policy",
            _ => "access denied",
        };
        return AppError::Forbidden(message.to_string()).into_response();
    }

    let outcome = if permitted { "allowed" } else { "audited" };
    counter!("abac_enforcement_total", "outcome" => outcome).increment(1);

    request.extensions_mut().insert(result);
    next.run(request).await
}
