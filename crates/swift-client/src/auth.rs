//! Authentication against the `/auth/v1.0` endpoint

use crate::{
    dispatcher::{Dispatcher, RequestSpec},
    ClientError, Result,
};
use reqwest::header::HeaderMap;
use tracing::{debug, info};

const STORAGE_USER: &str = "X-Storage-User";
const STORAGE_PASS: &str = "X-Storage-Pass";
const STORAGE_URL: &str = "x-storage-url";
const AUTH_TOKEN: &str = "x-auth-token";

/// Account path and token returned by a successful authentication.
///
/// Only constructed from a response carrying both values, so holding one
/// means paths can be built.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    storage_url: String,
    account: String,
    token: String,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("storage_url", &self.storage_url)
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl AuthSession {
    /// Build a session from the storage URL and token headers
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let storage_url = headers
            .get(STORAGE_URL)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ClientError::Auth("response lacks X-Storage-Url".to_string()))?;
        let token = headers
            .get(AUTH_TOKEN)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ClientError::Auth("response lacks X-Auth-Token".to_string()))?;

        let account = account_from_storage_url(storage_url).ok_or_else(|| {
            ClientError::Auth(format!("no account in storage url {}", storage_url))
        })?;

        Ok(Self {
            storage_url: storage_url.to_string(),
            account,
            token: token.to_string(),
        })
    }

    /// Storage URL as returned by the backend
    pub fn storage_url(&self) -> &str {
        &self.storage_url
    }

    /// Account segment used in every resource path
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Auth token attached to every request
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// The account is whatever follows `v1/` in the storage URL
fn account_from_storage_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("v1/")?;
    let account = rest.split(['/', '?']).next().unwrap_or_default();
    if account.is_empty() {
        None
    } else {
        Some(account.to_string())
    }
}

/// Run the authentication request once
pub(crate) async fn authenticate(dispatcher: &Dispatcher) -> Result<AuthSession> {
    let config = dispatcher.config();
    let spec = RequestSpec::get(config.auth_path.clone())
        .header(STORAGE_USER, &config.credentials.user)?
        .header(STORAGE_PASS, &config.credentials.pass)?;

    debug!(user = %config.credentials.user, "Authenticating");
    let response = dispatcher.issue(None, spec).await.map_err(|e| match e {
        ClientError::Http { status, body } => {
            ClientError::Auth(format!("authentication rejected ({}): {}", status, body))
        }
        other => other,
    })?;

    if !(200..300).contains(&response.status) {
        return Err(ClientError::Auth(format!(
            "unexpected authentication status {}",
            response.status
        )));
    }

    let session = AuthSession::from_headers(&response.headers)?;
    info!(account = %session.account(), "Authenticated");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(url: Option<&'static str>, token: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(url) = url {
            headers.insert(STORAGE_URL, HeaderValue::from_static(url));
        }
        if let Some(token) = token {
            headers.insert(AUTH_TOKEN, HeaderValue::from_static(token));
        }
        headers
    }

    #[test]
    fn test_session_from_headers() {
        let session = AuthSession::from_headers(&headers(
            Some("https://storage.local:8080/v1/AUTH_test"),
            Some("AUTH_tk123"),
        ))
        .unwrap();

        assert_eq!(session.account(), "AUTH_test");
        assert_eq!(session.token(), "AUTH_tk123");
        assert_eq!(session.storage_url(), "https://storage.local:8080/v1/AUTH_test");
    }

    #[test]
    fn test_missing_token_is_auth_error() {
        let result = AuthSession::from_headers(&headers(Some("https://h/v1/AUTH_a"), None));
        assert!(matches!(result, Err(ClientError::Auth(_))));
    }

    #[test]
    fn test_missing_url_is_auth_error() {
        let result = AuthSession::from_headers(&headers(None, Some("tk")));
        assert!(matches!(result, Err(ClientError::Auth(_))));
    }

    #[test]
    fn test_url_without_account_is_auth_error() {
        let result = AuthSession::from_headers(&headers(Some("https://h/v2/"), Some("tk")));
        assert!(matches!(result, Err(ClientError::Auth(_))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = AuthSession::from_headers(&headers(
            Some("http://h/v1/AUTH_a"),
            Some("secret-token"),
        ))
        .unwrap();
        assert!(!format!("{:?}", session).contains("secret-token"));
    }
}
