//! Error types for Prism
//!
//! Client-facing variants map onto HTTP status codes; `FatalIngestion` never
//! reaches a client because the ingestion task exits the process on it.

use hyper::StatusCode;

/// Main error type for Prism operations
#[derive(Debug, thiserror::Error)]
pub enum PrismError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Stale sequence key: {0}")]
    StaleCursor(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Fatal ingestion error: {0}")]
    FatalIngestion(String),
}

impl PrismError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::FeatureDisabled(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::StaleCursor(_) => StatusCode::GONE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Nats(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::FatalIngestion(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap any error raised while dispersing a block as fatal
    pub fn fatal(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::FatalIngestion(format!("{}: {}", context, err))
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

impl From<std::io::Error> for PrismError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for PrismError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for PrismError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for PrismError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for PrismError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encode failed: {}", err))
    }
}

impl From<bson::de::Error> for PrismError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON decode failed: {}", err))
    }
}

impl From<async_nats::SubscribeError> for PrismError {
    fn from(err: async_nats::SubscribeError) -> Self {
        Self::Nats(err.to_string())
    }
}

/// Result type alias for Prism operations
pub type Result<T> = std::result::Result<T, PrismError>;
