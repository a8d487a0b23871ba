use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Webhook signature missing or invalid. Hard reject, nothing recorded.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// External reference string failed to parse.
    #[error("malformed reference: {0}")]
    MalformedReference(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Required catalog data (pricing, access duration) is missing.
    /// Redelivery cannot fix a data problem.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The payment processor API was unreachable or returned an error.
    #[error("dependency failure: {0}")]
    DependencyFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Whether the webhook sender should redeliver the event.
///
/// This is the single source of truth for the HTTP status returned to the
/// processor: `Retryable` answers with a server error so the event is
/// redelivered, `NonRetryable` answers 200 so it is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retryable,
    NonRetryable,
}

impl AppError {
    /// Classify this failure for the webhook sender's retry mechanism.
    ///
    /// Validation-shaped failures (missing data, unparseable reference,
    /// catalog misconfiguration) are terminal: redelivering the same event
    /// cannot fix them, and answering 5xx would only cause a retry storm.
    /// Everything else defaults to `Retryable` - an erroneous non-retryable
    /// classification permanently drops a payment.
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            AppError::MalformedReference(_)
            | AppError::BadRequest(_)
            | AppError::NotFound(_)
            | AppError::Forbidden(_)
            | AppError::ConfigurationError(_) => RetryDecision::NonRetryable,
            AppError::AuthenticationFailure(_)
            | AppError::DependencyFailure(_)
            | AppError::Internal(_) => RetryDecision::Retryable,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthenticationFailure(_) => StatusCode::FORBIDDEN,
            AppError::MalformedReference(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ConfigurationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DependencyFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Internal(format!("Database error: {}", err))
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Internal(format!("Connection pool error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts, connect failures and processor 5xx all land here; the
        // fetch is a dependency call and must never be retried inline.
        AppError::DependencyFailure(format!("Processor API error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("Invalid JSON: {}", err))
    }
}
