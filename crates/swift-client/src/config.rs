//! Client configuration

use std::time::Duration;

/// Credentials used for the single authentication request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// Storage user, sent as `X-Storage-User`
    pub user: String,
    /// Storage password, sent as `X-Storage-Pass`
    pub pass: String,
    /// Storage host name
    pub host: String,
    /// Storage port
    pub port: u16,
}

impl Credentials {
    /// Create credentials for the given host and port
    pub fn new(
        user: impl Into<String>,
        pass: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
            host: host.into(),
            port,
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: "username".to_string(),
            pass: "userpass".to_string(),
            host: "hostname".to_string(),
            port: 3000,
        }
    }
}

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Authentication credentials and storage endpoint
    pub credentials: Credentials,
    /// URL scheme used to reach the storage endpoint
    pub scheme: String,
    /// Authentication path
    pub auth_path: String,
    /// Prefix for account, container and object paths
    pub api_prefix: String,
    /// User agent string
    pub user_agent: String,
    /// Request timeout; `None` leaves deadlines to the caller
    pub timeout: Option<Duration>,
    /// Inbound chunks buffered ahead of the outbound upload body
    pub proxy_buffer_chunks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            scheme: "https".to_string(),
            auth_path: "/auth/v1.0".to_string(),
            api_prefix: "/v1.0".to_string(),
            user_agent: format!("swift-client/{}", env!("CARGO_PKG_VERSION")),
            timeout: None,
            proxy_buffer_chunks: 16,
        }
    }
}

impl Config {
    /// Create a new config with the given credentials
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    /// Set the URL scheme (`http` or `https`)
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the authentication path
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.auth_path = path.into();
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the number of chunks buffered between inbound and outbound streams
    pub fn with_proxy_buffer_chunks(mut self, chunks: usize) -> Self {
        self.proxy_buffer_chunks = chunks.max(1);
        self
    }

    /// Build the base URL for API requests
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.scheme, self.credentials.host, self.credentials.port
        )
    }
}
