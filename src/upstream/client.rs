//! HTTP client for the upstream provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tokio::time;
use url::Url;

use crate::config::UpstreamConfig;
use crate::upstream::normalize::normalize;
use crate::upstream::{ConversationTurn, Upstream, UpstreamError, UpstreamResponse};

const RAPIDAPI_HOST: HeaderName = HeaderName::from_static("x-rapidapi-host");
const RAPIDAPI_KEY: HeaderName = HeaderName::from_static("x-rapidapi-key");

/// Longest slice of an error body kept for logging.
const ERROR_BODY_EXCERPT: usize = 256;

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    messages: &'a [ConversationTurn],
    web_access: bool,
}

/// Error building the client from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid header value for {0}")]
    Header(&'static str),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Provider client with fixed headers and a hard per-call deadline.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    endpoint: Url,
    web_access: bool,
    timeout: Duration,
    fallback: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ClientBuildError> {
        let base = Url::parse(&config.base_url)?;
        let endpoint = endpoint_url(&base, &config.path);

        let host = match &config.host {
            Some(host) => host.clone(),
            None => base.host_str().unwrap_or_default().to_string(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            RAPIDAPI_HOST,
            HeaderValue::from_str(&host).map_err(|_| ClientBuildError::Header("x-rapidapi-host"))?,
        );
        let mut key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ClientBuildError::Header("x-rapidapi-key"))?;
        key.set_sensitive(true);
        headers.insert(RAPIDAPI_KEY, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            web_access: config.web_access,
            timeout: Duration::from_millis(config.timeout_ms),
            fallback: config.fallback_result.clone(),
        })
    }

    /// Full URL every call is posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call(&self, turns: &[ConversationTurn]) -> Result<Value, UpstreamError> {
        let body = UpstreamRequest {
            messages: turns,
            web_access: self.web_access,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > ERROR_BODY_EXCERPT {
                let cut = (0..=ERROR_BODY_EXCERPT)
                    .rev()
                    .find(|i| text.is_char_boundary(*i))
                    .unwrap_or(0);
                text.truncate(cut);
            }
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = response.bytes().await.map_err(UpstreamError::Transport)?;
        let payload: Value =
            serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Malformed(e.to_string()))?;
        if !payload.is_object() {
            return Err(UpstreamError::Malformed(format!(
                "expected a JSON object, got {}",
                kind_of(&payload)
            )));
        }
        Ok(payload)
    }
}

/// Append `path` to the base URL's own path, keeping any prefix
/// (`https://gw.example.com/rapid` + `/o3mini` → `/rapid/o3mini`).
fn endpoint_url(base: &Url, path: &str) -> Url {
    let mut endpoint = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    endpoint.set_path(&joined);
    endpoint
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl Upstream for UpstreamClient {
    async fn send(&self, turns: Vec<ConversationTurn>) -> Result<UpstreamResponse, UpstreamError> {
        let payload = time::timeout(self.timeout, self.call(&turns))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))??;
        Ok(normalize(&payload, &self.fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_path() {
        let config = UpstreamConfig {
            base_url: "https://chatgpt-42.p.rapidapi.com".into(),
            path: "/gpt4".into(),
            ..UpstreamConfig::default()
        };
        let client = UpstreamClient::new(&config).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://chatgpt-42.p.rapidapi.com/gpt4");
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let config = UpstreamConfig {
            base_url: "https://gw.example.com/rapid".into(),
            path: "/o3mini".into(),
            ..UpstreamConfig::default()
        };
        let client = UpstreamClient::new(&config).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://gw.example.com/rapid/o3mini");

        let base = Url::parse("http://127.0.0.1:9000/api/").unwrap();
        assert_eq!(
            endpoint_url(&base, "/o3mini").as_str(),
            "http://127.0.0.1:9000/api/o3mini"
        );
    }

    #[test]
    fn rejects_key_with_newline() {
        let config = UpstreamConfig {
            api_key: "bad\nkey".into(),
            ..UpstreamConfig::default()
        };
        assert!(matches!(
            UpstreamClient::new(&config),
            Err(ClientBuildError::Header("x-rapidapi-key"))
        ));
    }

    #[test]
    fn request_body_shape() {
        let turns = [ConversationTurn::user("hello")];
        let body = UpstreamRequest {
            messages: &turns,
            web_access: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "messages": [{"role": "user", "content": "hello"}],
                "web_access": false
            })
        );
    }
}
