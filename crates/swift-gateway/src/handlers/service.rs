//! Account-level handlers

use crate::{AppState, ApiError};
use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

/// GET / - List containers
pub async fn list_containers(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let containers = state.client.list_containers().await?;
    Ok(Json(containers).into_response())
}

/// HEAD / - Health check; succeeds when the storage account answers
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let meta = state.client.retrieve_account_metadata().await?;

    let mut headers = HeaderMap::new();
    headers.insert("x-account-container-count", HeaderValue::from(meta.container_count));
    headers.insert("x-account-object-count", HeaderValue::from(meta.object_count));
    headers.insert("x-account-bytes-used", HeaderValue::from(meta.bytes_used));
    insert_prefixed(&mut headers, "x-account-meta-", &meta.metadata);

    Ok((StatusCode::OK, headers).into_response())
}

/// Copy `metadata` into `headers` under `prefix`, skipping unrepresentable entries
pub(crate) fn insert_prefixed(
    headers: &mut HeaderMap,
    prefix: &str,
    metadata: &std::collections::HashMap<String, String>,
) {
    for (key, value) in metadata {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(format!("{}{}", prefix, key).as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
}
