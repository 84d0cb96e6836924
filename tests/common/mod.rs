//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;

use prompt_gateway::config::GatewayConfig;
use prompt_gateway::lifecycle::Shutdown;
use prompt_gateway::net::{bind, PortSharing};
use prompt_gateway::{GatewayServer, WorkerInfo};

/// What the mock provider answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16, String),
    Raw(String),
    Delayed(Duration, Value),
}

/// One request seen by the mock provider.
#[derive(Debug, Clone)]
pub struct Seen {
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    reply: Arc<dyn Fn(&Value) -> Reply + Send + Sync>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

/// Programmable stand-in for the RapidAPI provider.
pub struct MockUpstream {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

/// Start a mock provider on an ephemeral port. `reply` picks the answer
/// for each posted body.
pub async fn start_mock_upstream<F>(reply: F) -> MockUpstream
where
    F: Fn(&Value) -> Reply + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        reply: Arc::new(reply),
        calls: calls.clone(),
        seen: seen.clone(),
    };

    let app = Router::new()
        .route("/o3mini", post(mock_handler))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream { addr, calls, seen }
}

/// Mock provider that always answers with the same JSON.
pub async fn start_fixed_upstream(body: Value) -> MockUpstream {
    start_mock_upstream(move |_| Reply::Json(body.clone())).await
}

async fn mock_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let reply = (state.reply)(&body);
    state.seen.lock().unwrap().push(Seen { headers, body });

    match reply {
        Reply::Json(value) => axum::Json(value).into_response(),
        Reply::Status(code, text) => {
            (StatusCode::from_u16(code).unwrap(), text).into_response()
        }
        Reply::Raw(text) => text.into_response(),
        Reply::Delayed(delay, value) => {
            tokio::time::sleep(delay).await;
            axum::Json(value).into_response()
        }
    }
}

/// Gateway config pointing at `upstream`, with a short timeout.
pub fn config_for(upstream: &MockUpstream) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.host = "127.0.0.1".to_string();
    config.listener.port = 0;
    config.upstream.base_url = upstream.base_url();
    config.upstream.api_key = "test-key".to_string();
    config.upstream.timeout_ms = 1_000;
    config
}

/// A gateway serving on an ephemeral port.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a single-process gateway with `config`.
pub async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    let listener = bind(&config.listener.bind_address(), PortSharing::Exclusive).unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = GatewayServer::new(config, WorkerInfo::current(None)).unwrap();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });

    RunningGateway { addr, shutdown }
}

/// POST `body` as JSON to `/generate`.
pub async fn generate(gateway: &RunningGateway, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(gateway.url("/generate"))
        .json(&body)
        .send()
        .await
        .unwrap()
}
