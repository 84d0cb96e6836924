//! Multi-process worker supervision.
//!
//! # Data Flow
//! ```text
//! cluster mode:
//!     Supervisor::run
//!         → spawner.rs (re-exec `<binary> worker --id N`)
//!         → pool.rs (watch exits, publish PoolStatus)
//!         → policy.rs (restart now / back off / abandon slot)
//! ```
//!
//! Workers bind the same port with `SO_REUSEPORT`; the kernel spreads
//! connections across them.

pub mod policy;
pub mod pool;
pub mod spawner;

pub use policy::{RestartDecision, RestartPolicy, RestartTracker};
pub use pool::{PoolStatus, Supervisor, SupervisorError};
pub use spawner::{ExecSpawner, WorkerSpawner};
