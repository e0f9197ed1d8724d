//! Client error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Authentication failed or the session is unusable
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with a status >= 400
    #[error("HTTP error ({status}): {body}")]
    Http {
        status: u16,
        body: String,
    },

    /// Inbound multipart body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// A composite operation completed only some of its steps
    #[error("Partial failure: {0}")]
    PartialFailure(#[from] PartialFailure),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a composite operation where an earlier step took effect but a
/// later one did not.
#[derive(Error, Debug)]
pub enum PartialFailure {
    /// The copy landed but the source could not be removed; the object now
    /// exists in both places.
    #[error("copied {source_path} to {dest_path} but failed to delete the source: {cause}")]
    CopiedNotDeleted {
        source_path: String,
        dest_path: String,
        #[source]
        cause: Box<ClientError>,
    },

    /// Some child objects could not be deleted before the container delete
    /// was issued.
    #[error("{} object(s) in {container} failed to delete; container delete {}", .failed.len(), container_outcome(.container_result))]
    ChildDeletes {
        container: String,
        failed: Vec<(String, ClientError)>,
        container_result: Option<Box<ClientError>>,
    },
}

fn container_outcome(result: &Option<Box<ClientError>>) -> String {
    match result {
        None => "succeeded".to_string(),
        Some(e) => format!("failed: {}", e),
    }
}

impl ClientError {
    /// Build an HTTP error from a status code and the drained response body
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Check if this is an authorization failure reported by the backend
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Check if this is a partial composite failure
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialFailure(_))
    }
}
