//! Gateway configuration

use serde::{Deserialize, Serialize};
use swift_client::{Config, Credentials};

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Storage backend host
    pub swift_host: String,
    /// Storage backend port
    pub swift_port: u16,
    /// Storage backend scheme (`http` or `https`)
    pub swift_scheme: String,
    /// Storage user
    pub swift_user: String,
    /// Storage password
    #[serde(skip_serializing, default)]
    pub swift_pass: String,
    /// Chunks buffered per streamed transfer
    pub proxy_buffer_chunks: usize,
    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let client = Config::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            swift_host: client.credentials.host,
            swift_port: client.credentials.port,
            swift_scheme: client.scheme,
            swift_user: client.credentials.user,
            swift_pass: client.credentials.pass,
            proxy_buffer_chunks: client.proxy_buffer_chunks,
            cors_enabled: true,
        }
    }
}

impl GatewayConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Storage client configuration derived from the gateway settings
    pub fn client_config(&self) -> Config {
        Config::new(Credentials::new(
            self.swift_user.clone(),
            self.swift_pass.clone(),
            self.swift_host.clone(),
            self.swift_port,
        ))
        .with_scheme(self.swift_scheme.clone())
        .with_proxy_buffer_chunks(self.proxy_buffer_chunks)
    }
}
