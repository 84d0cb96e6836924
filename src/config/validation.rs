//! Configuration validation.
//!
//! Serde handles the syntax; this module checks value ranges and the
//! upstream address. All errors are collected, not just the first.

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("upstream.base_url is not a valid http(s) URL: {0}")]
    InvalidBaseUrl(String),

    #[error("upstream.path must start with '/': {0}")]
    InvalidPath(String),

    #[error("supervisor.restart_base_delay_ms ({base}) exceeds restart_max_delay_ms ({max})")]
    BackoffBounds { base: u64, max: u64 },
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let nonzero: [(&'static str, u64); 8] = [
        ("listener.max_body_bytes", config.listener.max_body_bytes as u64),
        ("upstream.timeout_ms", config.upstream.timeout_ms),
        ("rate_limit.max_requests", u64::from(config.rate_limit.max_requests)),
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("rate_limit.purge_interval_secs", config.rate_limit.purge_interval_secs),
        ("conversation.max_turns", config.conversation.max_turns as u64),
        ("conversation.max_sessions", config.conversation.max_sessions as u64),
        ("supervisor.max_restarts", config.supervisor.max_restarts as u64),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    if config.supervisor.restart_window_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "supervisor.restart_window_secs",
        });
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
        _ => errors.push(ValidationError::InvalidBaseUrl(
            config.upstream.base_url.clone(),
        )),
    }

    if !config.upstream.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath(config.upstream.path.clone()));
    }

    let supervisor = &config.supervisor;
    if supervisor.restart_base_delay_ms > supervisor.restart_max_delay_ms {
        errors.push(ValidationError::BackoffBounds {
            base: supervisor.restart_base_delay_ms,
            max: supervisor.restart_max_delay_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Settings that are legal but probably wrong. Logged once tracing is up.
pub fn config_warnings(config: &GatewayConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.upstream.api_key.is_empty() {
        warnings.push("upstream.api_key is empty; upstream calls will likely be rejected");
    }
    warnings
}
