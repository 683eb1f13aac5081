//! horse-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use horse_gateway::app_state::AppState;
use horse_gateway::config::{GatewayConfig, LogFormat};
use horse_gateway::driver::build_driver;
use horse_gateway::router::build_app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config =
        GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, driver = ?config.driver, "starting horse-gateway");

    // Open the device
    let driver = build_driver(&config)
        .await
        .context("failed to open device driver")?;
    tracing::info!(driver = driver.name(), "device driver ready");

    // Build application state and router
    let app_state = AppState::new(&config, driver);
    let app = build_app(app_state, &config);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
