//! Prometheus metrics setup and metric definitions

use anyhow::Context;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    // Seconds. Sub-millisecond buckets because most evaluations are cache hits.
    let buckets = vec![
        0.0001, 0.00025, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)
        .context("failed to set histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines for all metrics from startup.
pub fn describe_metrics() {
    describe_counter!("abac_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "abac_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "abac_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    describe_counter!(
        "abac_evaluations_total",
        "Policy evaluations by final decision"
    );
    describe_histogram!(
        "abac_evaluation_duration_seconds",
        "Policy evaluation duration in seconds"
    );
    describe_counter!(
        "abac_policy_cache_total",
        "Tenant policy cache lookups by result"
    );
    describe_counter!(
        "abac_cache_operations_total",
        "Attribute and policy cache lookups by cache and result"
    );
    describe_counter!(
        "abac_attribute_provider_failures_total",
        "Attribute provider failures by provider"
    );
    describe_counter!(
        "abac_enforcement_total",
        "Enforcement middleware outcomes"
    );

    gauge!("abac_http_requests_in_flight").set(0.0);
    for decision in ["allow", "deny", "not_applicable", "indeterminate"] {
        counter!("abac_evaluations_total", "decision" => decision).absolute(0);
    }
    histogram!("abac_evaluation_duration_seconds").record(0.0);
    counter!("abac_policy_cache_total", "result" => "hit").absolute(0);
    counter!("abac_policy_cache_total", "result" => "miss").absolute(0);
    counter!("abac_attribute_provider_failures_total", "provider" => "").absolute(0);
    counter!("abac_enforcement_total", "outcome" => "allowed").absolute(0);
}
