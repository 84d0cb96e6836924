//! HTTP prompt gateway in front of a RapidAPI-hosted AI provider.
//!
//! One process per CPU (by default) serves `POST /generate`, `GET /health`
//! and static files on a shared port. A supervisor process keeps the pool
//! at full size.

pub mod config;
pub mod conversation;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod supervisor;
pub mod upstream;

pub use config::GatewayConfig;
pub use http::{GatewayServer, WorkerInfo};
pub use lifecycle::Shutdown;
pub use supervisor::{Supervisor, SupervisorError};
pub use upstream::{Upstream, UpstreamClient, UpstreamResponse};
