//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → optional TOML file (loader.rs)
//!     → environment overrides: PORT, RAPIDAPI_KEY, ... (loader.rs)
//!     → CLI flags (main.rs)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable, shared via Arc)
//! ```
//!
//! Workers re-read the same sources at startup, so every process in the
//! pool ends up with the same configuration.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ConversationConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    RateLimitConfig, SupervisorConfig, UpstreamConfig,
};
pub use validation::{config_warnings, validate_config, ValidationError};
