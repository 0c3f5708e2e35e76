//! GreekDash — multi-tenant chapter management platform.
//!
//! Main entry point that wires all subsystems and starts the API server.

use clap::Parser;
use greekdash_api::{ApiContext, ApiServer};
use greekdash_core::AppConfig;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "greekdash")]
#[command(about = "Multi-tenant chapter management platform")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "GREEKDASH__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "GREEKDASH__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "GREEKDASH__METRICS__PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greekdash=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("GreekDash starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );

    let ctx = ApiContext::new(config);
    let server = ApiServer::new(ctx);

    // Start metrics exporter
    if let Err(e) = server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("GreekDash is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    server.start_http().await?;

    Ok(())
}
