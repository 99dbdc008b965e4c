//! JSON errors for the management API

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found")]
    NotFound(String),

    #[error("Conflict")]
    Conflict(String),

    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized(String),

    #[error("Too many requests")]
    TooManyRequests(String),

    #[error("DNS provider error")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ddns_core::Error> for ApiError {
    fn from(err: ddns_core::Error) -> Self {
        use ddns_core::Error;

        let message = err.to_string();
        match err {
            Error::NotFound(_) => ApiError::NotFound(message),
            Error::AlreadyExists(_) | Error::Conflict(_) => ApiError::Conflict(message),
            Error::InvalidInput(_) => ApiError::InvalidRequest(message),
            Error::Authentication(_) => ApiError::Unauthorized(message),
            Error::RateLimited(_) => ApiError::TooManyRequests(message),
            ref e if e.is_backend() => ApiError::Upstream(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        let details = match self {
            // Internal details stay in the log
            ApiError::Internal(details) => {
                error!("Internal error: {}", details);
                None
            }
            ApiError::NotFound(details)
            | ApiError::Conflict(details)
            | ApiError::InvalidRequest(details)
            | ApiError::Unauthorized(details)
            | ApiError::TooManyRequests(details)
            | ApiError::Upstream(details) => Some(details),
        };

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        let cases = [
            (ddns_core::Error::not_found("x"), StatusCode::NOT_FOUND),
            (ddns_core::Error::already_exists("x"), StatusCode::CONFLICT),
            (ddns_core::Error::conflict("x"), StatusCode::CONFLICT),
            (ddns_core::Error::invalid_input("x"), StatusCode::BAD_REQUEST),
            (ddns_core::Error::auth("x"), StatusCode::UNAUTHORIZED),
            (ddns_core::Error::rate_limited("x"), StatusCode::TOO_MANY_REQUESTS),
            (ddns_core::Error::provider("cloudflare", "x"), StatusCode::BAD_GATEWAY),
            (ddns_core::Error::timeout("x"), StatusCode::BAD_GATEWAY),
            (ddns_core::Error::store("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = ApiError::from(ddns_core::Error::store("disk on fire")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!body.contains("disk on fire"));
    }
}
