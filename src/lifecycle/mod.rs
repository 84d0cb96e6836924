//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger()
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting, drains in-flight requests
//!             → background tasks exit
//!             → supervisor stops respawning and reaps workers
//! ```
//!
//! Workers shut down independently; there is no pool-wide drain barrier.

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
