//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, request log, body limit)
//!     → handlers.rs (validate → rate-check → upstream → respond)
//!     → error.rs (failures as {"error": ...})
//!     → Send to client (gzip when accepted)
//! ```

pub mod error;
pub mod handlers;
pub mod request;
pub mod server;

pub use error::ApiError;
pub use handlers::X_SESSION_ID;
pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer, WorkerInfo};
