/// Error types for the feed ranking service
///
/// `FeedError` is what the ranking engine returns. Expected degradations
/// (missing location, broken cursor, malformed rows) are not errors: they
/// surface as page state instead. `AppError` maps engine failures onto
/// HTTP responses.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// Seconds a client should wait before retrying after a storage outage
const RETRY_AFTER_SECS: u64 = 2;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Storage collaborator failed; safe to retry, nothing was written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FeedError {
    pub fn storage(err: anyhow::Error) -> Self {
        FeedError::StorageUnavailable(format!("{:#}", err))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::StorageUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

/// HTTP-facing error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::StorageUnavailable(msg) => AppError::ServiceUnavailable(msg),
            FeedError::InvalidRequest(msg) => AppError::BadRequest(msg),
            FeedError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);
        if status == StatusCode::SERVICE_UNAVAILABLE {
            builder.insert_header(("Retry-After", RETRY_AFTER_SECS.to_string()));
        }
        builder.json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "retryable": status == StatusCode::SERVICE_UNAVAILABLE,
        }))
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
