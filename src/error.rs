use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Tailhub application
#[derive(Error, Debug)]
pub enum TailError {
    // Workload errors
    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    #[error("Invalid workload id: {0}")]
    InvalidWorkloadId(String),

    // Log source errors
    #[error("Log source error: {0}")]
    Source(String),

    #[error("Container runtime returned {status}: {message}")]
    RuntimeApi { status: u16, message: String },

    #[error("Container runtime unreachable: {0}")]
    RuntimeUnavailable(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation timed out")]
    Timeout,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Tailhub operations
pub type Result<T> = std::result::Result<T, TailError>;

impl TailError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            TailError::InvalidWorkloadId(_)
            | TailError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            TailError::WorkloadNotFound(_) => StatusCode::NOT_FOUND,

            // 502 Bad Gateway
            TailError::Source(_) | TailError::RuntimeApi { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            TailError::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            TailError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            TailError::Serialization(_)
            | TailError::Io(_)
            | TailError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Whether the workload is absent or stopped, which ends a stream gracefully
    pub fn is_not_found(&self) -> bool {
        matches!(self, TailError::WorkloadNotFound(_))
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for TailError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from Docker client errors
//
// A 404 stays a generic runtime error here; only callers that know which
// workload they asked for can turn it into `WorkloadNotFound`.
impl From<bollard::errors::Error> for TailError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as DockerError;

        match err {
            DockerError::DockerResponseServerError {
                status_code,
                message,
            } => TailError::RuntimeApi {
                status: status_code,
                message,
            },
            DockerError::RequestTimeoutError => TailError::Timeout,
            DockerError::JsonDataError { .. } | DockerError::JsonSerdeError { .. } => {
                TailError::Source(err.to_string())
            }
            other => TailError::RuntimeUnavailable(other.to_string()),
        }
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for TailError {
    fn from(err: url::ParseError) -> Self {
        TailError::InvalidConfig(err.to_string())
    }
}
