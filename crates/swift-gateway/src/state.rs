//! Application state

use crate::config::GatewayConfig;
use std::sync::Arc;
use swift_client::SwiftClient;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Storage client; authenticates on first use
    pub client: Arc<SwiftClient>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = SwiftClient::new(config.client_config())?;
        info!(
            "Storage backend: {}",
            client.config().base_url()
        );

        Ok(Self {
            config,
            client: Arc::new(client),
        })
    }
}
