//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::middleware::{enforce_middleware, EnforcementState, ObservabilityLayer};
use crate::policy::attributes::{
    EnvironmentConfig, EnvironmentProvider, HierarchyProvider, HierarchyStore,
    RequestContextProvider, ResourceOwnershipProvider, ResourceOwnershipStore, RoleStore,
    TenantStore, UserAttributeProvider, UserStore,
};
use crate::policy::{EngineConfig, PolicyEngine};
use crate::repository::{InMemoryPolicyRepository, PolicyRepository};
use crate::state::HasPolicyEngine;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Span};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub policy_repo: Arc<dyn PolicyRepository>,
    pub policy_engine: Arc<PolicyEngine>,
    span: Span,
}

/// CRM lookups backing the user, ownership and hierarchy providers.
#[derive(Clone)]
pub struct CrmStores {
    pub users: Arc<dyn UserStore>,
    pub roles: Option<Arc<dyn RoleStore>>,
    pub tenants: Option<Arc<dyn TenantStore>>,
    pub ownership: Arc<dyn ResourceOwnershipStore>,
    pub hierarchy: Arc<dyn HierarchyStore>,
}

impl HasPolicyEngine for AppState {
    fn policy_repo(&self) -> &Arc<dyn PolicyRepository> {
        &self.policy_repo
    }

    fn policy_engine(&self) -> &Arc<PolicyEngine> {
        &self.policy_engine
    }
}

impl AppState {
    /// Wires the engine over `policy_repo` and registers the built-in
    /// attribute providers.
    pub fn new(config: Config, policy_repo: Arc<dyn PolicyRepository>) -> Self {
        let span = tracing::info_span!("abac", service = %config.telemetry.service_name);
        let engine = PolicyEngine::new(
            policy_repo.clone(),
            EngineConfig {
                algorithm: config.abac.combining_algorithm,
                cache_ttl: config.abac.policy_cache_ttl(),
                enable_trace: config.abac.enable_trace,
                span: span.clone(),
            },
        );

        register_default_providers(&engine, &config, &span);

        Self {
            config: Arc::new(config),
            policy_repo,
            policy_engine: Arc::new(engine),
            span,
        }
    }

    /// Registers the store-backed providers after the built-in ones.
    /// Ownership runs before hierarchy so `is_manager_of_owner` sees the
    /// resource owner.
    pub fn register_crm_providers(&self, stores: CrmStores) {
        let abac = &self.config.abac;

        let mut user = UserAttributeProvider::new(
            "user",
            Some(Duration::from_secs(abac.user_cache_ttl_secs)),
            self.span.clone(),
        )
        .with_user_store(stores.users);
        if let Some(roles) = stores.roles {
            user = user.with_role_store(roles);
        }
        if let Some(tenants) = stores.tenants {
            user = user.with_tenant_store(tenants);
        }

        let ownership = ResourceOwnershipProvider::new(
            "resource_ownership",
            stores.ownership,
            Some(Duration::from_secs(abac.resource_cache_ttl_secs)),
            self.span.clone(),
        );
        let hierarchy = HierarchyProvider::new(
            "hierarchy",
            stores.hierarchy,
            Some(Duration::from_secs(abac.hierarchy_cache_ttl_secs)),
            self.span.clone(),
        );

        self.policy_engine.register_attribute_provider(Arc::new(user));
        self.policy_engine.register_attribute_provider(Arc::new(ownership));
        self.policy_engine.register_attribute_provider(Arc::new(hierarchy));
    }
}

/// Environment and request-context providers; user, ownership and hierarchy
/// providers need CRM stores and are registered by the embedding service.
fn register_default_providers(engine: &PolicyEngine, config: &Config, span: &Span) {
    let environment = EnvironmentProvider::new(
        EnvironmentConfig {
            name: "environment".to_string(),
            timezone: config.environment.timezone.clone(),
            location: config.environment.location.clone(),
            ..Default::default()
        },
        span,
    );
    engine.register_attribute_provider(Arc::new(environment));
    engine.register_attribute_provider(Arc::new(RequestContextProvider::new("request_context")));
}

/// Run the HTTP server until Ctrl-C / SIGTERM
pub async fn run(config: Config, prometheus_handle: Option<PrometheusHandle>) -> Result<()> {
    let http_addr = config.http_addr();
    let state = AppState::new(config, Arc::new(InMemoryPolicyRepository::new()));
    let engine = state.policy_engine.clone();

    info!(
        algorithm = %engine.algorithm(),
        providers = engine.provider_count(),
        enforcement = state.config.enforcement.enabled,
        "ABAC engine ready"
    );

    let app = build_router(state, prometheus_handle);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// ABAC management and evaluation routes, relative to `/api/v1/abac`.
fn abac_routes<S: HasPolicyEngine>() -> Router<S> {
    Router::new()
        .route(
            "/policies",
            get(api::abac::list_policies::<S>).post(api::abac::create_policy::<S>),
        )
        .route(
            "/policies/{id}",
            get(api::abac::get_policy::<S>)
                .put(api::abac::update_policy::<S>)
                .delete(api::abac::delete_policy::<S>),
        )
        .route("/policies/clone/{id}", post(api::abac::clone_policy::<S>))
        .route("/evaluate", post(api::abac::evaluate::<S>))
        .route("/evaluate/batch", post(api::abac::evaluate_batch::<S>))
        .route("/test", post(api::abac::test_policy))
        .route("/export", get(api::abac::export_policies::<S>))
        .route("/import", post(api::abac::import_policies::<S>))
}

/// Build the HTTP router
///
/// Generic over the state type so tests can supply their own
/// `HasPolicyEngine` implementation. Enforcement is mounted only when the
/// configuration enables it.
pub fn build_router_with<S: HasPolicyEngine>(
    state: S,
    config: &Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let metrics_router = Router::new()
        .route("/metrics", get(api::metrics::metrics_handler))
        .with_state(Arc::new(prometheus_handle));

    let mut router = Router::new()
        // Health endpoints
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready::<S>))
        .nest("/api/v1/abac", abac_routes::<S>());

    if config.enforcement.enabled {
        let enforcement = EnforcementState::new(
            state.policy_engine().clone(),
            config.enforcement.clone(),
        );
        router = router.layer(axum::middleware::from_fn_with_state(
            enforcement,
            enforce_middleware,
        ));
    }

    router
        .with_state(state)
        .merge(metrics_router)
        .layer(ObservabilityLayer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build the HTTP router for the production state
pub fn build_router(state: AppState, prometheus_handle: Option<PrometheusHandle>) -> Router {
    let config = state.config.clone();
    build_router_with(state, &config, prometheus_handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn state(config: Config) -> AppState {
        AppState::new(config, Arc::new(InMemoryPolicyRepository::new()))
    }

    fn test_config() -> Config {
        Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            abac: Default::default(),
            environment: Default::default(),
            enforcement: Default::default(),
            telemetry: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_default_providers_registered() {
        let state = state(test_config());
        assert_eq!(state.policy_engine.provider_count(), 2);
    }

    #[tokio::test]
    async fn test_crm_providers_registered_after_defaults() {
        use crate::policy::attributes::{
            hierarchy::MockHierarchyStore, ownership::MockResourceOwnershipStore,
            user::MockUserStore,
        };

        let state = state(test_config());
        state.register_crm_providers(CrmStores {
            users: Arc::new(MockUserStore::new()),
            roles: None,
            tenants: None,
            ownership: Arc::new(MockResourceOwnershipStore::new()),
            hierarchy: Arc::new(MockHierarchyStore::new()),
        });
        assert_eq!(state.policy_engine.provider_count(), 5);
    }

    #[tokio::test]
    async fn test_health_route() {
        let app = build_router(state(test_config()), None);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_ready_route() {
        let app = build_router(state(test_config()), None);
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_enforcement_layer_mounted_when_enabled() {
        let mut config = test_config();
        config.enforcement.enabled = true;
        let app = build_router(state(config), None);

        // No policies and default deny: the management API itself is protected.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/abac/policies")
                    .header("x-tenant-id", uuid::Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let app = build_router(
            state({
                let mut config = test_config();
                config.enforcement.enabled = true;
                config
            }),
            None,
        );
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
