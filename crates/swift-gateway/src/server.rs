//! Server startup and lifecycle

use crate::{AppState, GatewayConfig, routes};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

async fn prepare(config: &GatewayConfig) -> anyhow::Result<(axum::Router, TcpListener)> {
    let state = Arc::new(AppState::new(config.clone())?);

    // A backend that is down at startup is not fatal; calls retry authentication
    match state.client.authenticate().await {
        Ok(session) => info!("Authenticated against storage account {}", session.account()),
        Err(e) => warn!("Storage authentication failed, will retry on first request: {}", e),
    }

    let app = routes::create_router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Swift gateway listening on http://{}", addr);

    Ok((app, listener))
}

/// Run the gateway server
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    let (app, listener) = prepare(&config).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run server with graceful shutdown
pub async fn run_server_with_shutdown(
    config: GatewayConfig,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let (app, listener) = prepare(&config).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Gateway shutdown complete");

    Ok(())
}
