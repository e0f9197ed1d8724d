//! Container operation handlers

use crate::handlers::service::insert_prefixed;
use crate::{AppState, ApiError};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// PUT /{container} - Create container
pub async fn create_container(
    State(state): State<Arc<AppState>>,
    Path(container): Path<String>,
) -> Result<Response, ApiError> {
    let response = state.client.create_container(&container).await?;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::CREATED);

    Ok((status, [("Location", format!("/{}", container))]).into_response())
}

/// DELETE /{container} - Delete a container and everything in it
pub async fn delete_container(
    State(state): State<Arc<AppState>>,
    Path(container): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state.client.delete_container(&container).await?;

    Ok(Json(json!({
        "container": container,
        "objects_deleted": outcome.objects_deleted,
    }))
    .into_response())
}

/// HEAD /{container} - Container usage and metadata
pub async fn head_container(
    State(state): State<Arc<AppState>>,
    Path(container): Path<String>,
) -> Result<Response, ApiError> {
    let meta = state.client.retrieve_container_metadata(&container).await?;

    let mut headers = HeaderMap::new();
    headers.insert("x-container-object-count", HeaderValue::from(meta.object_count));
    headers.insert("x-container-bytes-used", HeaderValue::from(meta.bytes_used));
    insert_prefixed(&mut headers, "x-container-meta-", &meta.metadata);

    Ok((StatusCode::NO_CONTENT, headers).into_response())
}

/// GET /{container} - List objects
pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    Path(container): Path<String>,
) -> Result<Response, ApiError> {
    let objects = state.client.list_objects(&container).await?;
    Ok(Json(objects).into_response())
}
