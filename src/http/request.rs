//! Per-request logging and request IDs.
//!
//! Every request gets an `x-request-id` (generated when the client sent
//! none) which is echoed on the response and attached to the request span.
//! Non-GET requests have their body buffered once, up to the configured
//! limit, so it can be logged alongside method and path.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderName, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;

use crate::http::error::ApiError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Read the request ID set by the request-id layer.
pub fn request_id(request: &Request) -> &str {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Log method, path and (for non-GET requests) the body, then pass the
/// request on unchanged. Bodies larger than `max_body` are answered with 413,
/// bodies that fail mid-read with 400.
pub async fn log_request(
    State(max_body): State<usize>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if method == Method::GET || method == Method::HEAD {
        tracing::info!(method = %method, path = %path, "Request");
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, max_body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(method = %method, path = %path, error = %e, "Request body rejected");
            return body_error(e).into_response();
        }
    };

    let logged = (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned());
    tracing::info!(
        method = %method,
        path = %path,
        body = logged.as_deref(),
        "Request"
    );

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Tell an oversized body apart from one that broke off (client abort, bad framing).
fn body_error(error: axum::Error) -> ApiError {
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(&error);
    while let Some(e) = cause {
        if e.is::<LengthLimitError>() {
            return ApiError::PayloadTooLarge;
        }
        cause = e.source();
    }
    ApiError::BodyRead(error.to_string())
}
