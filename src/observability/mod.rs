//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (tracing events, pretty or JSON)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (shared by supervisor and workers)
//!     → per-process Prometheus endpoint (optional)
//! ```
//!
//! Request IDs (`x-request-id`) are attached to the per-request span by
//! the HTTP layer.

pub mod logging;
pub mod metrics;
