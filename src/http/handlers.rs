//! Route handlers.
//!
//! `POST /generate` walks Received → Validated → RateChecked →
//! UpstreamCalled → Responded, leaving early with a JSON error at the first
//! failing step.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::conversation::SessionId;
use crate::http::error::{ApiError, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::{client_identity, RateDecision};
use crate::upstream::{ConversationTurn, UpstreamResponse};

pub const X_SESSION_ID: HeaderName = HeaderName::from_static("x-session-id");

/// Body of `POST /generate`. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<Value>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl GenerateRequest {
    /// The prompt if it is a string with at least one non-whitespace character.
    fn prompt(&self) -> Option<&str> {
        match &self.prompt {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }
}

pub async fn generate_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let response = match generate(&state, peer, &headers, body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    metrics::record_request(response.status().as_u16());
    response
}

async fn generate(
    state: &AppState,
    peer: SocketAddr,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    // Validate
    let request = parse_body(headers, body)?;
    let prompt = request.prompt().ok_or(ApiError::PromptRequired)?.to_string();

    // Rate-check
    let mut remaining = None;
    if let Some(limiter) = &state.limiter {
        let identity = client_identity(peer, headers, state.trusted_proxy_hops);
        match limiter.check(&identity) {
            RateDecision::Allowed { remaining: left } => {
                remaining = Some((limiter.max_requests(), left));
            }
            RateDecision::Limited { retry_after } => {
                tracing::warn!(
                    client = %identity,
                    retry_after = ?retry_after,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited();
                return Err(ApiError::RateLimited {
                    retry_after,
                    limit: limiter.max_requests(),
                });
            }
        }
    }

    // Dispatch
    let session = state.conversations.as_ref().map(|_| session_for(headers, &request));
    let answer = dispatch(state, prompt, session.clone()).await?;

    // Respond
    let mut response = (StatusCode::OK, Json(answer)).into_response();
    let out = response.headers_mut();
    if let Some((limit, left)) = remaining {
        out.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
        out.insert(X_RATELIMIT_REMAINING, HeaderValue::from(left));
    }
    if let Some(session) = session {
        if let Ok(value) = HeaderValue::from_str(session.as_str()) {
            out.insert(X_SESSION_ID, value);
        }
    }
    Ok(response)
}

fn parse_body(
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<GenerateRequest, ApiError> {
    let bytes = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BodyRead(rejection.body_text())
        }
    })?;

    // Like a typical JSON body parser: anything that is not a JSON body
    // is treated as an empty object.
    if bytes.iter().all(u8::is_ascii_whitespace) || !is_json(headers) {
        return Ok(GenerateRequest::default());
    }
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidBody(e.to_string()))?;
    if !value.is_object() {
        return Ok(GenerateRequest::default());
    }
    serde_json::from_value(value).map_err(|e| ApiError::InvalidBody(e.to_string()))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn session_for(headers: &HeaderMap, request: &GenerateRequest) -> SessionId {
    headers
        .get(&X_SESSION_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(SessionId::parse)
        .or_else(|| request.session_id.as_deref().and_then(SessionId::parse))
        .unwrap_or_else(SessionId::generate)
}

/// Call upstream on a detached task: if the client goes away the call still
/// completes, is logged, and (in conversation mode) lands in the history.
async fn dispatch(
    state: &AppState,
    prompt: String,
    session: Option<SessionId>,
) -> Result<UpstreamResponse, ApiError> {
    let upstream = state.upstream.clone();
    let store = state.conversations.clone();

    let task = tokio::spawn(async move {
        let mut turns = match (&store, &session) {
            (Some(store), Some(id)) => store.history(id),
            _ => Vec::new(),
        };
        turns.push(ConversationTurn::user(prompt.clone()));

        let started = Instant::now();
        let result = upstream.send(turns).await;
        match &result {
            Ok(answer) => {
                metrics::record_upstream("ok", started);
                tracing::debug!(elapsed = ?started.elapsed(), "Upstream call succeeded");
                if let (Some(store), Some(id)) = (&store, &session) {
                    store.record_exchange(id, &prompt, &answer.result);
                }
            }
            Err(e) => {
                metrics::record_upstream(e.kind(), started);
                tracing::error!(error = %e, elapsed = ?started.elapsed(), "API error");
            }
        }
        result
    });

    match task.await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::Internal(format!("upstream task failed: {e}"))),
    }
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "worker": state.worker.id,
        "pid": state.worker.pid,
    }))
}
