//! Resilience primitives used by the worker supervisor.
//!
//! # Data Flow
//! ```text
//! Worker exit:
//!     → circuit_breaker.rs (count the crash, open past threshold)
//!     → backoff.rs (delay before the replacement is spawned)
//! ```
//!
//! Upstream calls get a hard timeout and no retry; that lives in
//! `upstream::client`.

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{calculate_backoff, Backoff};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
