//! Object operation handlers

use crate::handlers::service::insert_prefixed;
use crate::{AppState, ApiError};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use swift_client::{channel_sink, InboundUpload, ProgressCallback, UploadOutcome, UploadProgress};

/// Header naming the source of a server-side copy
pub const COPY_FROM: &str = "x-copy-from";
/// Header naming the source of a move
pub const MOVE_FROM: &str = "x-move-from";
const OBJECT_META_PREFIX: &str = "x-object-meta-";

/// GET /{container}/{object} - Stream an object back to the caller
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((container, object)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (mut sink, receiver) = channel_sink(state.config.proxy_buffer_chunks);
    let (head, body) = receiver.into_parts();

    let client = Arc::clone(&state.client);
    let transfer = tokio::spawn(async move {
        client.get_file(&container, &object, &mut sink).await
    });

    match head.await {
        Ok(headers) => {
            let mut response = Response::new(Body::from_stream(body));
            *response.headers_mut() = headers;
            Ok(response)
        }
        // The sink was aborted before any header was committed
        Err(_) => match transfer.await {
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(_)) => Err(ApiError::Internal("transfer ended without a response".to_string())),
            Err(e) => Err(ApiError::Internal(format!("transfer task failed: {}", e))),
        },
    }
}

/// HEAD /{container}/{object} - Object metadata
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    Path((container, object)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let meta = state
        .client
        .retrieve_object_metadata(&container, &object)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.content_length));
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, etag);
    }
    if let Some(ct) = meta.content_type.as_deref().and_then(|ct| HeaderValue::from_str(ct).ok()) {
        headers.insert(header::CONTENT_TYPE, ct);
    }
    if let Some(modified) = meta.last_modified {
        if let Ok(value) = HeaderValue::from_str(&modified.to_rfc2822()) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    insert_prefixed(&mut headers, OBJECT_META_PREFIX, &meta.metadata);

    Ok((StatusCode::OK, headers).into_response())
}

/// DELETE /{container}/{object} - Delete object
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((container, object)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state.client.delete_object(&container, &object).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// PUT /{container}/{object} - Upload, or copy/move when X-Copy-From or
/// X-Move-From is present
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path((container, object)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if let Some(source) = header_value(&headers, COPY_FROM) {
        let (from_container, from_object) = split_source(source)?;
        let outcome = state
            .client
            .copy_object(&container, &object, &from_container, &from_object)
            .await?;
        return Ok(copied_response(outcome.status, outcome.etag));
    }

    if let Some(source) = header_value(&headers, MOVE_FROM) {
        let (from_container, from_object) = split_source(source)?;
        let outcome = state
            .client
            .move_object(&container, &object, &from_container, &from_object)
            .await?;
        return Ok(copied_response(outcome.status, outcome.etag));
    }

    let outcome = state
        .client
        .create_object(&container, &object, inbound(&headers, body), Some(progress_logger(&object)))
        .await?;
    Ok(uploaded_response(&container, &object, outcome))
}

/// POST /{container}/{object} - Replace an object from the body, or with no
/// Content-Type replace its X-Object-Meta-* metadata
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    Path((container, object)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if !headers.contains_key(header::CONTENT_TYPE) {
        let metadata: HashMap<String, String> = headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix(OBJECT_META_PREFIX)?;
                Some((key.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();
        let response = state
            .client
            .update_object_metadata(&container, &object, &metadata)
            .await?;
        let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::ACCEPTED);
        return Ok(status.into_response());
    }

    let outcome = state
        .client
        .update_object(&container, &object, inbound(&headers, body), Some(progress_logger(&object)))
        .await?;
    Ok(uploaded_response(&container, &object, outcome))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse a percent-encoded `/container/object` (leading slash optional)
fn split_source(source: &str) -> Result<(String, String), ApiError> {
    let invalid = || ApiError::BadRequest(format!("invalid source object {:?}", source));
    let (container, object) = source
        .trim_start_matches('/')
        .split_once('/')
        .filter(|(c, o)| !c.is_empty() && !o.is_empty())
        .ok_or_else(invalid)?;
    let container = urlencoding::decode(container).map_err(|_| invalid())?;
    let object = urlencoding::decode(object).map_err(|_| invalid())?;
    Ok((container.into_owned(), object.into_owned()))
}

fn inbound(headers: &HeaderMap, body: Body) -> InboundUpload {
    let mut upload = InboundUpload::new(body.into_data_stream());
    if let Some(ct) = header_value(headers, header::CONTENT_TYPE.as_str()) {
        upload = upload.with_content_type(ct);
    }
    if let Some(length) = header_value(headers, header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse().ok())
    {
        upload = upload.with_content_length(length);
    }
    upload
}

fn progress_logger(object: &str) -> ProgressCallback {
    let object = object.to_string();
    Arc::new(move |progress: UploadProgress| {
        tracing::debug!(
            object = %object,
            received = progress.bytes_received,
            percent = progress.percentage().unwrap_or(0.0),
            "Upload progress"
        );
    })
}

fn uploaded_response(container: &str, object: &str, outcome: UploadOutcome) -> Response {
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::CREATED);
    let body = Json(json!({
        "container": container,
        "object": object,
        "etag": outcome.etag,
        "bytes_received": outcome.bytes_received,
        "bytes_stored": outcome.bytes_sent,
    }));

    match outcome.etag.as_deref().and_then(|e| HeaderValue::from_str(&format!("\"{}\"", e)).ok()) {
        Some(etag) => (status, [(header::ETAG, etag)], body).into_response(),
        None => (status, body).into_response(),
    }
}

fn copied_response(status: u16, etag: Option<String>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::CREATED);
    (status, Json(json!({ "etag": etag }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_source() {
        let pair = |c: &str, o: &str| (c.to_string(), o.to_string());
        assert_eq!(split_source("/box/a/b.txt").unwrap(), pair("box", "a/b.txt"));
        assert_eq!(split_source("box/a.txt").unwrap(), pair("box", "a.txt"));
        assert_eq!(split_source("/box/a%2541%20b%3F.txt").unwrap(), pair("box", "a%41 b?.txt"));
        assert!(split_source("/box/%FF%FE").is_err());
        assert!(split_source("/box").is_err());
        assert!(split_source("/box/").is_err());
    }
}
