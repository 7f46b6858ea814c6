//! Error types for cookie-relay
//!
//! Endpoint failures are converted to `AppError`, which implements
//! `IntoResponse` so every path answers with a JSON body and a status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::relay::RelayError;

/// Application-wide error type
///
/// Rendered as `{ "success": false, "message": ... }`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed client input (400)
    #[error("{0}")]
    Validation(String),

    /// Session missing or rejected (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Upstream refused the call; its status is passed through
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// Upstream answered 2xx without a token (500)
    #[error("Access token missing in response")]
    MissingAccessToken,

    /// Relay failure surfaced unchanged
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Upstream { status, .. } => (*status, "upstream"),
            AppError::MissingAccessToken => {
                (StatusCode::INTERNAL_SERVER_ERROR, "missing_access_token")
            }
            AppError::Relay(err) => (
                err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                err.kind(),
            ),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to its status code and the shared
    /// `{success, message}` body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "success": false,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
