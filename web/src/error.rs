//! Error types for non-GraphQL HTTP handlers.
//!
//! GraphQL failures travel inside the `errors` array of a 200 response.
//! Requests rejected before the GraphQL executor, such as a body that does
//! not parse, answer with an [`AppError`] JSON body `{code, message}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cinema_core::{Error, ErrorCategory};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Report>, AppError> {
///     let report = state.inventory.seat_map(id).await?;
///     Ok(Json(report))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            source: None,
        }
    }

    /// Attach an internal cause, logged but never returned.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_INPUT")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR")
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message,
            "UPSTREAM_UNAVAILABLE",
        )
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// HTTP status for each error category.
#[must_use]
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::AuthenticationRequired | Error::InvalidToken => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        other => match other.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::State | ErrorCategory::Coupon => StatusCode::CONFLICT,
            ErrorCategory::Availability => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Authentication | ErrorCategory::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let app = Self::new(status_for(&err), err.public_message(), err.code());
        match err {
            Error::Internal(detail) => app.with_source(anyhow::anyhow!(detail)),
            _ => app,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("internal error").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_codes() {
        let err = AppError::from(Error::SeatsUnavailable {
            seats: vec!["B5".into()],
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "SEATS_UNAVAILABLE");
        assert_eq!(err.to_string(), "[SEATS_UNAVAILABLE] seats unavailable: B5");
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = AppError::from(Error::internal("pool timed out"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "[INTERNAL_ERROR] internal error");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn auth_errors_are_unauthorized() {
        assert_eq!(
            status_for(&Error::AuthenticationRequired),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&Error::Forbidden("admin only".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&Error::unavailable("movie service")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
