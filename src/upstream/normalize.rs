//! Coalescing of upstream payload shapes.
//!
//! Providers answer with `{"result": ...}`, with OpenAI-style
//! `{"choices": [{"text": ...}]}` or `{"choices": [{"message": {"content": ...}}]}`,
//! or with nothing usable at all. Every one of them collapses into
//! [`UpstreamResponse`].

use serde_json::Value;

use crate::upstream::UpstreamResponse;

/// Normalize a decoded upstream body. Total over every JSON value.
pub fn normalize(payload: &Value, fallback: &str) -> UpstreamResponse {
    let status = payload
        .get("status")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let result = non_empty_str(payload.get("result"))
        .or_else(|| {
            let choice = payload.get("choices")?.get(0)?;
            non_empty_str(choice.get("text"))
                .or_else(|| non_empty_str(choice.get("message")?.get("content")))
        })
        .unwrap_or(fallback)
        .to_string();

    UpstreamResponse { status, result }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}
