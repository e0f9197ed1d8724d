//! Error types and their HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use swift_client::{ClientError, PartialFailure};
use thiserror::Error;

/// Error codes reported in the JSON error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BackendAuth,
    BackendUnavailable,
    Backend,
    InvalidBody,
    InvalidRequest,
    NotFound,
    PartialFailure,
    InternalError,
}

impl ErrorCode {
    /// Get the error code string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackendAuth => "BackendAuth",
            Self::BackendUnavailable => "BackendUnavailable",
            Self::Backend => "Backend",
            Self::InvalidBody => "InvalidBody",
            Self::InvalidRequest => "InvalidRequest",
            Self::NotFound => "NotFound",
            Self::PartialFailure => "PartialFailure",
            Self::InternalError => "InternalError",
        }
    }
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::BadRequest(_) => ErrorCode::InvalidRequest,
            Self::Internal(_) => ErrorCode::InternalError,
            Self::Client(e) => match e {
                ClientError::Auth(_) => ErrorCode::BackendAuth,
                ClientError::Network(_) => ErrorCode::BackendUnavailable,
                ClientError::Http { status: 404, .. } => ErrorCode::NotFound,
                ClientError::Http { .. } => ErrorCode::Backend,
                ClientError::Decode(_) => ErrorCode::InvalidBody,
                ClientError::InvalidArgument(_) => ErrorCode::InvalidRequest,
                ClientError::PartialFailure(_) => ErrorCode::PartialFailure,
                ClientError::Config(_) | ClientError::Io(_) => ErrorCode::InternalError,
            },
        }
    }

    /// Get the HTTP status code. Backend error statuses pass through.
    pub fn status_code(&self) -> StatusCode {
        if let Self::Client(ClientError::Http { status, .. }) = self {
            return StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
        }
        match self.error_code() {
            ErrorCode::BackendAuth | ErrorCode::BackendUnavailable | ErrorCode::Backend => {
                StatusCode::BAD_GATEWAY
            }
            ErrorCode::InvalidBody | ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::PartialFailure | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> serde_json::Value {
        match self {
            Self::Client(ClientError::PartialFailure(PartialFailure::ChildDeletes {
                failed,
                ..
            })) => json!({
                "failed_objects": failed.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            }),
            Self::Client(ClientError::PartialFailure(PartialFailure::CopiedNotDeleted {
                source_path,
                dest_path,
                ..
            })) => json!({
                "source": source_path,
                "destination": dest_path,
            }),
            _ => serde_json::Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(code = code.as_str(), "Request failed: {}", self);
        }

        let body = json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "details": self.details(),
            }
        });

        // Also exposed as a header; HEAD responses carry no body
        (status, [("x-error-code", code.as_str())], Json(body)).into_response()
    }
}
