//! Restart policy for worker slots.
//!
//! A slot's first restart is immediate. Workers that die again before
//! running `stable_after` back off exponentially. More than `max_restarts`
//! exits inside `window` opens the slot's crash-loop breaker and the slot
//! is abandoned.

use std::time::{Duration, Instant};

use crate::config::SupervisorConfig;
use crate::resilience::{Backoff, BreakerState, CircuitBreaker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub backoff: Backoff,
    pub stable_after: Duration,
    pub max_restarts: usize,
    pub window: Duration,
}

impl From<&SupervisorConfig> for RestartPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            backoff: Backoff::new(
                Duration::from_millis(config.restart_base_delay_ms),
                Duration::from_millis(config.restart_max_delay_ms),
            ),
            stable_after: Duration::from_secs(config.stable_after_secs),
            max_restarts: config.max_restarts,
            window: Duration::from_secs(config.restart_window_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Spawn a replacement after `delay`.
    Restart { delay: Duration, attempt: u32 },
    /// Crash loop: stop respawning this slot.
    GiveUp { recent_exits: usize },
}

/// Per-slot exit history.
#[derive(Debug, Clone)]
pub struct RestartTracker {
    breaker: CircuitBreaker,
    consecutive: u32,
}

impl RestartTracker {
    pub fn new(policy: &RestartPolicy) -> Self {
        Self {
            breaker: CircuitBreaker::new(policy.max_restarts, policy.window),
            consecutive: 0,
        }
    }

    /// Decide what to do about a worker that exited at `now` after running `uptime`.
    pub fn on_exit(
        &mut self,
        policy: &RestartPolicy,
        uptime: Duration,
        now: Instant,
    ) -> RestartDecision {
        if uptime >= policy.stable_after {
            self.consecutive = 0;
        }
        if self.breaker.record_failure(now) == BreakerState::Open {
            return RestartDecision::GiveUp {
                recent_exits: self.breaker.recent_failures(),
            };
        }
        let attempt = self.consecutive;
        self.consecutive = self.consecutive.saturating_add(1);
        RestartDecision::Restart {
            delay: policy.backoff.delay(attempt),
            attempt,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.breaker.is_open()
    }
}
