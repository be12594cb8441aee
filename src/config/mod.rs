//! Configuration management for the ABAC service

use crate::cache::ttl;
use crate::domain::{CombiningAlgorithm, Effect};
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Engine and attribute cache configuration
    pub abac: AbacConfig,
    /// Environment attribute provider configuration
    pub environment: EnvironmentSettings,
    /// Enforcement middleware configuration
    pub enforcement: EnforcementConfig,
    /// Logging and metrics configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct AbacConfig {
    pub combining_algorithm: CombiningAlgorithm,
    pub policy_cache_ttl_secs: u64,
    pub enable_trace: bool,
    pub user_cache_ttl_secs: u64,
    pub resource_cache_ttl_secs: u64,
    pub hierarchy_cache_ttl_secs: u64,
}

impl Default for AbacConfig {
    fn default() -> Self {
        Self {
            combining_algorithm: CombiningAlgorithm::DenyOverrides,
            policy_cache_ttl_secs: ttl::POLICY_SECS,
            enable_trace: false,
            user_cache_ttl_secs: ttl::USER_SECS,
            resource_cache_ttl_secs: ttl::RESOURCE_SECS,
            hierarchy_cache_ttl_secs: ttl::HIERARCHY_SECS,
        }
    }
}

impl AbacConfig {
    pub fn policy_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.policy_cache_ttl_secs)
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentSettings {
    pub timezone: String,
    pub location: Option<String>,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            location: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    /// Mount the enforcement middleware on protected routes
    pub enabled: bool,
    /// `false` means audit-only: denials are logged but requests pass
    pub enforce: bool,
    /// Effect applied when no policy is applicable
    pub default_effect: Effect,
    /// Paths never evaluated
    pub skip_paths: Vec<String>,
    /// Prefix stripped before reading `/{resource_type}/{resource_id}`
    pub path_prefix: String,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enforce: true,
            default_effect: Effect::Deny,
            skip_paths: vec![
                "/health".to_string(),
                "/ready".to_string(),
                "/metrics".to_string(),
            ],
            path_prefix: "/api/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// `json` or `pretty`
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "crm-iam-abac".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn parse_effect(raw: &str) -> Result<Effect> {
    match raw.to_ascii_lowercase().as_str() {
        "allow" => Ok(Effect::Allow),
        "deny" => Ok(Effect::Deny),
        other => anyhow::bail!("Invalid ABAC_DEFAULT_EFFECT: {other}"),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let enforcement_defaults = EnforcementConfig::default();

        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            abac: AbacConfig {
                combining_algorithm: env::var("ABAC_COMBINING_ALGORITHM")
                    .unwrap_or_else(|_| "deny_overrides".to_string())
                    .parse()
                    .context("Invalid ABAC_COMBINING_ALGORITHM")?,
                policy_cache_ttl_secs: env::var("ABAC_POLICY_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| ttl::POLICY_SECS.to_string())
                    .parse()
                    .context("Invalid ABAC_POLICY_CACHE_TTL_SECS")?,
                enable_trace: env_bool("ABAC_ENABLE_TRACE", false),
                user_cache_ttl_secs: env::var("ABAC_USER_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| ttl::USER_SECS.to_string())
                    .parse()
                    .unwrap_or(ttl::USER_SECS),
                resource_cache_ttl_secs: env::var("ABAC_RESOURCE_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| ttl::RESOURCE_SECS.to_string())
                    .parse()
                    .unwrap_or(ttl::RESOURCE_SECS),
                hierarchy_cache_ttl_secs: env::var("ABAC_HIERARCHY_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| ttl::HIERARCHY_SECS.to_string())
                    .parse()
                    .unwrap_or(ttl::HIERARCHY_SECS),
            },
            environment: EnvironmentSettings {
                timezone: env::var("ABAC_ENV_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
                location: env::var("ABAC_ENV_LOCATION").ok(),
            },
            enforcement: EnforcementConfig {
                enabled: env_bool("ABAC_ENFORCE_ENABLED", false),
                enforce: env_bool("ABAC_ENFORCE_MODE", true),
                default_effect: match env::var("ABAC_DEFAULT_EFFECT") {
                    Ok(raw) => parse_effect(&raw)?,
                    Err(_) => Effect::Deny,
                },
                skip_paths: env::var("ABAC_SKIP_PATHS")
                    .map(|raw| parse_list(&raw))
                    .unwrap_or(enforcement_defaults.skip_paths),
                path_prefix: env::var("ABAC_PATH_PREFIX")
                    .unwrap_or(enforcement_defaults.path_prefix),
            },
            telemetry: TelemetryConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "crm-iam-abac".to_string()),
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
                metrics_enabled: env_bool("METRICS_ENABLED", false),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
