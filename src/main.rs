use anyhow::Result;
use crm_iam_abac::{config::Config, server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let prometheus_handle = telemetry::init(&config.telemetry)?;

    info!("Starting CRM IAM ABAC service");
    info!(
        "HTTP server listening on {} (algorithm: {})",
        config.http_addr(),
        config.abac.combining_algorithm
    );

    server::run(config, prometheus_handle).await
}
