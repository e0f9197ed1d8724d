//! Single-request primitive shared by every operation

use crate::{
    auth::AuthSession,
    sink::ResponseSink,
    types::{StreamedResponse, SwiftResponse},
    ClientError, Config, Result,
};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Client, Method, Response,
};
use tracing::{debug, warn};

/// Header carrying the auth token on every request
pub const AUTH_TOKEN: &str = "x-auth-token";
/// Legacy alias of the auth token header
pub const STORAGE_TOKEN: &str = "x-storage-token";

/// Body of an outbound request
#[derive(Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// Fully buffered body
    Bytes(Bytes),
    /// Streamed body
    Stream(reqwest::Body),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => write!(f, "Bytes({})", b.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// One outbound request. Headers set here take precedence over the
/// dispatcher defaults (auth token, user agent).
#[derive(Debug, Default)]
pub struct RequestSpec {
    /// Unencoded request path
    pub path: String,
    /// HTTP method, `GET` unless set
    pub method: Method,
    /// Caller overrides
    pub headers: HeaderMap,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// Request body
    pub body: RequestBody,
}

impl RequestSpec {
    /// Create a request for `method` on `path`
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            ..Default::default()
        }
    }

    /// Create a `GET` request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Set a header, replacing any earlier value
    pub fn header(mut self, name: &str, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::InvalidArgument(format!("header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value.as_ref())
            .map_err(|e| ClientError::InvalidArgument(format!("header {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Add a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a buffered body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }
}

/// Builds and issues requests against the storage endpoint
#[derive(Clone, Debug)]
pub struct Dispatcher {
    config: Config,
    http: Client,
}

impl Dispatcher {
    /// Create a dispatcher with its own connection pool
    pub fn new(config: Config) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ClientError::Network)?;
        Ok(Self { config, http })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Default headers for a request, before caller overrides
    fn default_headers(&self, session: Option<&AuthSession>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .map_err(|e| ClientError::Config(format!("user agent: {}", e)))?,
        );
        if let Some(session) = session {
            let token = HeaderValue::from_str(session.token())
                .map_err(|e| ClientError::Auth(format!("unusable token: {}", e)))?;
            headers.insert(AUTH_TOKEN, token.clone());
            headers.insert(STORAGE_TOKEN, token);
        }
        Ok(headers)
    }

    /// Send a request and return the response as soon as headers arrive.
    /// Only connection-level failures are reported here.
    pub async fn send(&self, session: Option<&AuthSession>, spec: RequestSpec) -> Result<Response> {
        let url = format!("{}{}", self.config.base_url(), encode_path(&spec.path));

        let mut headers = self.default_headers(session)?;
        for (name, value) in spec.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let mut req = self.http.request(spec.method.clone(), &url).headers(headers);
        if !spec.query.is_empty() {
            req = req.query(&spec.query);
        }
        req = match spec.body {
            RequestBody::Empty => req,
            RequestBody::Bytes(data) => req.body(data),
            RequestBody::Stream(body) => req.body(body),
        };

        debug!("Sending {} request to {}", spec.method, url);
        Ok(req.send().await?)
    }

    /// Issue a request and join the whole response body.
    ///
    /// A status >= 400 still drains the body, which is returned inside
    /// [`ClientError::Http`].
    pub async fn issue(&self, session: Option<&AuthSession>, spec: RequestSpec) -> Result<SwiftResponse> {
        let response = self.send(session, spec).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if status >= 400 {
            debug!(status, "Backend returned an error status");
            return Err(ClientError::http(status, String::from_utf8_lossy(&body)));
        }

        Ok(SwiftResponse {
            status,
            headers,
            body,
        })
    }

    /// Issue a request and forward each response chunk to `sink` as it
    /// arrives, after mirroring Content-Length and Content-Type onto it.
    ///
    /// Error statuses never reach the sink. If the connection fails after the
    /// first chunk was forwarded the error is returned and `sink` is left
    /// open; the caller decides how to abort it.
    pub async fn issue_to_sink<K>(
        &self,
        session: Option<&AuthSession>,
        spec: RequestSpec,
        sink: &mut K,
    ) -> Result<StreamedResponse>
    where
        K: ResponseSink + ?Sized,
    {
        let response = self.send(session, spec).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        if status >= 400 {
            let body = response.bytes().await?;
            return Err(ClientError::http(status, String::from_utf8_lossy(&body)));
        }

        for name in [header::CONTENT_LENGTH, header::CONTENT_TYPE] {
            if let Some(value) = headers.get(&name).and_then(|v| v.to_str().ok()) {
                sink.header(name.as_str(), value);
            }
        }

        let mut forwarded = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(forwarded, "Response stream failed mid-transfer: {}", e);
                    return Err(ClientError::Network(e));
                }
            };
            forwarded += chunk.len() as u64;
            sink.write(chunk).await?;
        }
        sink.end().await?;

        Ok(StreamedResponse {
            status,
            headers,
            bytes_forwarded: forwarded,
        })
    }
}

/// Percent-encode each segment of a path, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("/v1.0/AUTH_x/photos/a.jpg"), "/v1.0/AUTH_x/photos/a.jpg");
    }

    #[test]
    fn test_encode_path_special_characters() {
        let encoded = encode_path("/v1.0/acct/box/100% done? yes.txt");
        assert_eq!(encoded, "/v1.0/acct/box/100%25%20done%3F%20yes.txt");
    }

    #[test]
    fn test_encode_path_roundtrip() {
        for name in ["a%b", "what?", "with space", "%3F", "ünïcødé/x y"] {
            let path = format!("/c/{}", name);
            let encoded = encode_path(&path);
            let decoded = urlencoding::decode(&encoded).unwrap();
            assert_eq!(decoded, path);
        }
    }

    #[test]
    fn test_caller_header_wins() {
        let spec = RequestSpec::get("/x")
            .header("User-Agent", "custom")
            .unwrap()
            .header("user-agent", "custom-2")
            .unwrap();
        assert_eq!(spec.method, Method::GET);
        assert_eq!(spec.headers.get(header::USER_AGENT).unwrap(), "custom-2");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let result = RequestSpec::get("/x").header("bad header", "v");
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }
}
