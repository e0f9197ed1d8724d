//! Common types for the client SDK

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A container in an account listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container name
    pub name: String,
    /// Number of objects
    #[serde(default)]
    pub count: u64,
    /// Total bytes stored
    #[serde(default)]
    pub bytes: u64,
}

/// An object in a container listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Object name
    pub name: String,
    /// MD5 of the object content
    #[serde(default)]
    pub hash: String,
    /// Size in bytes
    #[serde(default)]
    pub bytes: u64,
    /// Content type
    #[serde(default)]
    pub content_type: Option<String>,
    /// Last modified, as reported by the listing
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Account metadata (`HEAD` on the account)
#[derive(Clone, Debug, Default)]
pub struct AccountMetadata {
    /// Number of containers
    pub container_count: u64,
    /// Number of objects across all containers
    pub object_count: u64,
    /// Bytes used across all containers
    pub bytes_used: u64,
    /// `X-Account-Meta-*` values keyed by suffix
    pub metadata: HashMap<String, String>,
}

impl AccountMetadata {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            container_count: header_u64(headers, "x-account-container-count"),
            object_count: header_u64(headers, "x-account-object-count"),
            bytes_used: header_u64(headers, "x-account-bytes-used"),
            metadata: prefixed_metadata(headers, "x-account-meta-"),
        }
    }
}

/// Container metadata (`HEAD` on a container)
#[derive(Clone, Debug, Default)]
pub struct ContainerMetadata {
    /// Number of objects
    pub object_count: u64,
    /// Bytes used
    pub bytes_used: u64,
    /// `X-Container-Meta-*` values keyed by suffix
    pub metadata: HashMap<String, String>,
}

impl ContainerMetadata {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            object_count: header_u64(headers, "x-container-object-count"),
            bytes_used: header_u64(headers, "x-container-bytes-used"),
            metadata: prefixed_metadata(headers, "x-container-meta-"),
        }
    }
}

/// Object metadata (`HEAD` on an object)
#[derive(Clone, Debug, Default)]
pub struct ObjectMetadata {
    /// ETag (MD5 of the content)
    pub etag: String,
    /// Content type
    pub content_type: Option<String>,
    /// Content length
    pub content_length: u64,
    /// Last modified
    pub last_modified: Option<DateTime<Utc>>,
    /// `X-Object-Meta-*` values keyed by suffix
    pub metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: header_str(headers, "etag")
                .map(|s| s.trim_matches('"').to_string())
                .unwrap_or_default(),
            content_type: header_str(headers, "content-type").map(|s| s.to_string()),
            content_length: header_u64(headers, "content-length"),
            last_modified: header_str(headers, "last-modified")
                .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
                .map(|d| d.with_timezone(&Utc)),
            metadata: prefixed_metadata(headers, "x-object-meta-"),
        }
    }
}

/// A fully drained backend response
#[derive(Clone, Debug)]
pub struct SwiftResponse {
    /// HTTP status
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Joined response body
    pub body: Bytes,
}

impl SwiftResponse {
    /// Body as UTF-8 text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// ETag header with quotes stripped
    pub fn etag(&self) -> Option<String> {
        header_str(&self.headers, "etag").map(|s| s.trim_matches('"').to_string())
    }
}

/// Status and headers of a response whose body went to a sink
#[derive(Clone, Debug)]
pub struct StreamedResponse {
    /// HTTP status
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Bytes forwarded to the sink
    pub bytes_forwarded: u64,
}

/// Result of a streamed upload
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    /// HTTP status of the backend response
    pub status: u16,
    /// ETag assigned by the backend
    pub etag: Option<String>,
    /// Raw bytes read from the inbound stream
    pub bytes_received: u64,
    /// Bytes written to the outbound request body
    pub bytes_sent: u64,
}

/// Result of copying an object
#[derive(Clone, Debug)]
pub struct CopyOutcome {
    /// HTTP status of the copy request
    pub status: u16,
    /// ETag of the new object
    pub etag: Option<String>,
}

/// Result of deleting a container and its contents
#[derive(Clone, Debug, Default)]
pub struct DeleteContainerOutcome {
    /// Objects deleted before the container itself
    pub objects_deleted: usize,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> u64 {
    header_str(headers, name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn prefixed_metadata(headers: &HeaderMap, prefix: &str) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    for (name, value) in headers.iter() {
        if let Some(key) = name.as_str().strip_prefix(prefix) {
            if let Ok(v) = value.to_str() {
                metadata.insert(key.to_string(), v.to_string());
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_container_listing_defaults() {
        let containers: Vec<Container> =
            serde_json::from_str(r#"[{"name":"a"},{"name":"b","count":2,"bytes":10}]"#).unwrap();
        assert_eq!(containers[0].count, 0);
        assert_eq!(containers[1].bytes, 10);
    }

    #[test]
    fn test_object_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("\"abc123\""));
        headers.insert("content-length", HeaderValue::from_static("42"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert(
            "last-modified",
            HeaderValue::from_static("Tue, 15 Nov 1994 12:45:26 GMT"),
        );
        headers.insert("x-object-meta-pin", HeaderValue::from_static("1234"));

        let meta = ObjectMetadata::from_headers(&headers);
        assert_eq!(meta.etag, "abc123");
        assert_eq!(meta.content_length, 42);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert!(meta.last_modified.is_some());
        assert_eq!(meta.metadata.get("pin").map(String::as_str), Some("1234"));
    }

    #[test]
    fn test_account_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-account-container-count", HeaderValue::from_static("3"));
        headers.insert("x-account-bytes-used", HeaderValue::from_static("1024"));
        headers.insert("x-account-meta-owner", HeaderValue::from_static("ops"));

        let meta = AccountMetadata::from_headers(&headers);
        assert_eq!(meta.container_count, 3);
        assert_eq!(meta.object_count, 0);
        assert_eq!(meta.bytes_used, 1024);
        assert_eq!(meta.metadata.get("owner").map(String::as_str), Some("ops"));
    }
}
