//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! worker startup
//!     → listener.rs (bind, SO_REUSEPORT when pooled)
//!     → axum::serve (accept loop, graceful shutdown)
//! ```

pub mod listener;

pub use listener::{bind, ListenerError, PortSharing};
