//! Shared helpers for integration tests
//!
//! Routers are built with the production `build_router()` over an in-memory
//! policy store; requests go through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use crm_iam_abac::config::{
    AbacConfig, Config, EnforcementConfig, EnvironmentSettings, TelemetryConfig,
};
use crm_iam_abac::repository::InMemoryPolicyRepository;
use crm_iam_abac::server::{build_router, AppState};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub fn test_config() -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        abac: AbacConfig::default(),
        environment: EnvironmentSettings::default(),
        enforcement: EnforcementConfig::default(),
        telemetry: TelemetryConfig::default(),
    }
}

pub fn test_state(config: Config) -> AppState {
    AppState::new(config, Arc::new(InMemoryPolicyRepository::new()))
}

pub fn test_app() -> Router {
    build_router(test_state(test_config()), None)
}

/// Sends a request as `tenant` and parses the JSON response body, if any.
pub async fn send(
    app: &Router,
    method: Method,
    path: &str,
    tenant: Uuid,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("x-tenant-id", tenant.to_string());
    let body = match body {
        Some(value) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    if body_bytes.is_empty() {
        return (status, None);
    }
    (status, serde_json::from_slice(&body_bytes).ok())
}

pub async fn get_json(app: &Router, path: &str, tenant: Uuid) -> (StatusCode, Option<Value>) {
    send(app, Method::GET, path, tenant, None).await
}

pub async fn post_json<T: Serialize>(
    app: &Router,
    path: &str,
    tenant: Uuid,
    body: &T,
) -> (StatusCode, Option<Value>) {
    let body = serde_json::to_value(body).unwrap();
    send(app, Method::POST, path, tenant, Some(body)).await
}

pub async fn put_json<T: Serialize>(
    app: &Router,
    path: &str,
    tenant: Uuid,
    body: &T,
) -> (StatusCode, Option<Value>) {
    let body = serde_json::to_value(body).unwrap();
    send(app, Method::PUT, path, tenant, Some(body)).await
}

pub async fn delete_json(app: &Router, path: &str, tenant: Uuid) -> (StatusCode, Option<Value>) {
    send(app, Method::DELETE, path, tenant, None).await
}

/// Body of a minimal valid policy with one allow rule.
pub fn policy_body(name: &str, resource: &str, action: &str) -> Value {
    serde_json::json!({
        "name": name,
        "description": format!("{name} policy"),
        "enabled": true,
        "priority": 10,
        "rules": [{
            "effect": "allow",
            "actions": [action],
            "resources": [resource]
        }]
    })
}

/// Creates a policy and returns its id.
pub async fn create_policy(app: &Router, tenant: Uuid, body: Value) -> String {
    let (status, response) = post_json(app, "/api/v1/abac/policies", tenant, &body).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {response:?}");
    response.unwrap()["data"]["id"].as_str().unwrap().to_string()
}
