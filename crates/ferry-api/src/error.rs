//! Error types for the tool API transport.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to a tool's API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials were rejected.
    #[error("authentication failed ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The credentials are valid but may not act on this resource.
    #[error("permission denied on {endpoint}: {message}")]
    Forbidden { endpoint: String, message: String },

    /// Resource not found.
    #[error("not found: {endpoint}")]
    NotFound { endpoint: String },

    /// Rate limited.
    #[error("rate limited{}", match (endpoint, retry_after_secs) {
        (Some(ep), Some(secs)) => format!(" on {} (retry after {}s)", ep, secs),
        (Some(ep), None) => format!(" on {}", ep),
        (None, Some(secs)) => format!(" (retry after {}s)", secs),
        (None, None) => String::new(),
    })]
    RateLimited {
        /// The endpoint that was rate limited (optional).
        endpoint: Option<String>,
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// The server failed to handle the request.
    #[error("server error ({status}) on {endpoint}: {message}")]
    Server {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The server refused the request body or parameters.
    #[error("request rejected ({status}) on {endpoint}: {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// HTTP request failed before a status was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The tool's request throttle was shut down.
    #[error("request throttle closed")]
    ThrottleClosed(#[from] tokio::sync::AcquireError),

    /// The batch this request belonged to aborted before it was sent.
    #[error("not sent: batch aborted")]
    Aborted,
}

impl ApiError {
    /// Map a non-success status to an error.
    pub fn from_status(
        endpoint: &str,
        status: StatusCode,
        message: String,
        retry_after_secs: Option<u64>,
    ) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized {
                status: status.as_u16(),
                message,
            },
            StatusCode::FORBIDDEN => ApiError::Forbidden {
                endpoint: endpoint.to_string(),
                message,
            },
            StatusCode::NOT_FOUND => ApiError::NotFound {
                endpoint: endpoint.to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
                endpoint: Some(endpoint.to_string()),
                retry_after_secs,
            },
            s if s.is_server_error() => ApiError::Server {
                endpoint: endpoint.to_string(),
                status: s.as_u16(),
                message,
            },
            s => ApiError::Rejected {
                endpoint: endpoint.to_string(),
                status: s.as_u16(),
                message,
            },
        }
    }

    /// Network faults, 5xx and 429: worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited { .. } | ApiError::Server { .. } => true,
            ApiError::Http(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }

    /// 401 and 404: retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. } | ApiError::NotFound { .. })
    }

    /// 403: the credentials cannot act on this one entity.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ApiError::Forbidden { .. })
    }

    /// The request never left the process.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ApiError::Aborted)
    }
}

/// Outcome of a failed collection fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Retryable failure that persisted through every attempt.
    #[error("fetch failed after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ApiError,
    },

    /// Failure surfaced immediately, without retry.
    #[error("fetch failed: {0}")]
    Fatal(#[source] ApiError),
}

impl FetchError {
    /// The underlying transport error.
    pub fn api_error(&self) -> &ApiError {
        match self {
            FetchError::Transient { source, .. } => source,
            FetchError::Fatal(source) => source,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        if err.is_transient() {
            FetchError::Transient {
                attempts: 1,
                source: err,
            }
        } else {
            FetchError::Fatal(err)
        }
    }
}
