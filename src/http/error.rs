//! Client-facing error mapping.
//!
//! Every failure leaves the gateway as `{"error": "<fixed message>"}` with a
//! matching status code. Internal detail stays in the logs.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::upstream::UpstreamError;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Request-level failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Prompt is required")]
    PromptRequired,

    #[error("Invalid JSON body")]
    InvalidBody(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Failed to read request body")]
    BodyRead(String),

    #[error("Too many requests. Slow down!")]
    RateLimited { retry_after: Duration, limit: u32 },

    #[error("Failed to fetch AI response.")]
    Upstream(#[from] UpstreamError),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::PromptRequired | ApiError::InvalidBody(_) | ApiError::BodyRead(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::InvalidBody(detail) => {
                tracing::debug!(detail = %detail, "Rejected malformed request body");
            }
            ApiError::BodyRead(detail) => {
                tracing::debug!(detail = %detail, "Request body could not be read");
            }
            ApiError::Internal(detail) => tracing::error!(detail = %detail, "Internal error"),
            _ => {}
        }

        let status = self.status();
        let mut response = (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let ApiError::RateLimited { retry_after, limit } = self {
            let headers = response.headers_mut();
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
        }
        response
    }
}
