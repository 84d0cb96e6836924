//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! POST /generate (after prompt validation):
//!     → client_ip.rs (peer + trusted X-Forwarded-For hops → identity)
//!     → rate_limit.rs (sliding window per identity)
//!     → 429 or pass to upstream dispatch
//! ```
//!
//! # Design Decisions
//! - Trusted-hop count is explicit configuration, never inferred
//! - Spoofed left-most X-Forwarded-For entries are ignored
//! - Limiter state is per worker process

pub mod client_ip;
pub mod rate_limit;

pub use client_ip::client_identity;
pub use rate_limit::{RateDecision, RateLimiter};
