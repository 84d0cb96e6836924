//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (port, body limit, static assets).
    pub listener: ListenerConfig,

    /// Upstream provider settings.
    pub upstream: UpstreamConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Multi-turn conversation history.
    pub conversation: ConversationConfig,

    /// Worker pool supervision.
    pub supervisor: SupervisorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Listening port.
    pub port: u16,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,

    /// Directory served for every path other than the API routes.
    pub static_dir: String,

    /// Allow cross-origin requests from any origin.
    pub cors_allow_all: bool,

    /// Gzip-compress responses when the client accepts it.
    pub compression: bool,
}

impl ListenerConfig {
    /// The `host:port` pair to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_body_bytes: 50 * 1024,
            static_dir: "public".to_string(),
            cors_allow_all: false,
            compression: true,
        }
    }
}

/// Upstream provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the provider.
    pub base_url: String,

    /// Path appended to the base URL for every call.
    pub path: String,

    /// Value of the `x-rapidapi-host` header. Derived from `base_url` when unset.
    pub host: Option<String>,

    /// Value of the `x-rapidapi-key` header.
    pub api_key: String,

    /// Whether the provider may browse the web while answering.
    pub web_access: bool,

    /// Hard bound on a single upstream call, in milliseconds.
    pub timeout_ms: u64,

    /// Result used when the provider's payload carries no usable text.
    pub fallback_result: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://chatgpt-42.p.rapidapi.com".to_string(),
            path: "/o3mini".to_string(),
            host: None,
            api_key: String::new(),
            web_access: false,
            timeout_ms: 5_000,
            fallback_result: "No result found.".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Accepted requests per identity per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Number of reverse-proxy hops whose `X-Forwarded-For` entries are trusted.
    pub trusted_proxy_hops: usize,

    /// How often expired identities are purged, in seconds.
    pub purge_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 20,
            window_secs: 60,
            trusted_proxy_hops: 1,
            purge_interval_secs: 60,
        }
    }
}

/// Conversation history configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Keep per-session history and send it upstream with each prompt.
    pub enabled: bool,

    /// Maximum turns retained per session (oldest exchange dropped first; odd values round down).
    pub max_turns: usize,

    /// Maximum live sessions per worker.
    pub max_sessions: usize,

    /// Sessions idle longer than this are dropped, in seconds.
    pub idle_ttl_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_turns: 40,
            max_sessions: 10_000,
            idle_ttl_secs: 1_800,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Pool size. Defaults to the number of CPU cores.
    pub workers: Option<usize>,

    /// Base delay for exponential restart backoff in milliseconds.
    pub restart_base_delay_ms: u64,

    /// Maximum restart delay in milliseconds.
    pub restart_max_delay_ms: u64,

    /// A worker alive at least this long resets its backoff, in seconds.
    pub stable_after_secs: u64,

    /// Restarts tolerated per slot within `restart_window_secs` before giving up.
    pub max_restarts: usize,

    /// Crash-loop detection window in seconds.
    pub restart_window_secs: u64,

    /// Time granted to workers to drain on shutdown before SIGKILL, in seconds.
    pub shutdown_grace_secs: u64,
}

impl SupervisorConfig {
    /// Effective pool size.
    pub fn pool_size(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            workers: None,
            restart_base_delay_ms: 100,
            restart_max_delay_ms: 10_000,
            stable_after_secs: 30,
            max_restarts: 10,
            restart_window_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics host.
    pub metrics_host: String,

    /// Metrics port of the first worker; worker `i` listens on `metrics_port + i`.
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_host: "127.0.0.1".to_string(),
            metrics_port: 9090,
        }
    }
}
