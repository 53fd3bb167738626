use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Boxed cause carried by upstream failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the egress pool
#[derive(Error, Debug)]
pub enum PoolError {
    // Worker lifecycle errors
    #[error("Failed to launch worker {name}: {reason}")]
    Launch { name: String, reason: String },

    #[error("Failed to retire worker {name}: {reason}")]
    Retire { name: String, reason: String },

    // Routing errors
    #[error("No workers available in the pool")]
    NoWorkerAvailable,

    #[error("Upstream request through worker {worker} failed: {source}")]
    Upstream {
        worker: String,
        #[source]
        source: BoxError,
    },

    // Ledger errors
    #[error("Ledger error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Ledger constraint violated: {0}")]
    LedgerConflict(String),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            PoolError::InvalidRequest(_) | PoolError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 409 Conflict
            PoolError::LedgerConflict(_) => StatusCode::CONFLICT,

            // 502 Bad Gateway
            PoolError::Upstream { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            PoolError::NoWorkerAvailable
            | PoolError::LedgerUnavailable(_)
            | PoolError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            PoolError::Launch { .. }
            | PoolError::Retire { .. }
            | PoolError::Persistence(_)
            | PoolError::Io(_)
            | PoolError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
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

    /// Whether the ledger could not complete the operation
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            PoolError::Persistence(_)
                | PoolError::LedgerUnavailable(_)
                | PoolError::LedgerConflict(_)
                | PoolError::DatabaseConnection(_)
        )
    }
}

impl IntoResponse for PoolError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<url::ParseError> for PoolError {
    fn from(err: url::ParseError) -> Self {
        PoolError::InvalidRequest(format!("Invalid URL: {}", err))
    }
}
