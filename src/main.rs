use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use blastgrid_server::config::ServerConfig;
use blastgrid_server::metrics::Metrics;
use blastgrid_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    info!("Blastgrid Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {e}");
    }
    info!(
        "Configuration loaded: {}:{}, world {}x{}",
        config.bind_address, config.port, config.world_width, config.world_height
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    // Create WebTransport server
    let server = WebTransportServer::new(config.clone(), metrics.clone()).await?;

    info!(
        "Server ready on https://{}:{}",
        config.bind_address, config.port
    );
    info!("Certificate hash: {}", server.cert_hash());

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped");

    Ok(())
}
