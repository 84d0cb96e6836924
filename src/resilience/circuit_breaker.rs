//! Crash-loop circuit breaker.
//!
//! # States
//! - Closed: failures are counted, restarts proceed
//! - Open: more than `threshold` failures landed inside `window`; no more restarts
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures within window > threshold
//! ```
//!
//! Open is terminal: a slot that keeps crashing stays abandoned until the
//! supervisor restarts.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failures: VecDeque<Instant>,
    threshold: usize,
    window: Duration,
    state: BreakerState,
}

impl CircuitBreaker {
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            failures: VecDeque::with_capacity(threshold + 1),
            threshold,
            window,
            state: BreakerState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    /// Record a failure at `now` and return the resulting state.
    pub fn record_failure(&mut self, now: Instant) -> BreakerState {
        if self.is_open() {
            return self.state;
        }
        while self
            .failures
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            self.failures.pop_front();
        }
        self.failures.push_back(now);
        if self.failures.len() > self.threshold {
            self.state = BreakerState::Open;
        }
        self.state
    }

    /// Failures currently inside the window.
    pub fn recent_failures(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_past_threshold() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for i in 0..3 {
            assert_eq!(
                breaker.record_failure(t0 + Duration::from_secs(i)),
                BreakerState::Closed
            );
        }
        assert_eq!(
            breaker.record_failure(t0 + Duration::from_secs(3)),
            BreakerState::Open
        );
    }

    #[test]
    fn old_failures_age_out() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        breaker.record_failure(t0);
        breaker.record_failure(t0 + Duration::from_secs(1));
        assert_eq!(
            breaker.record_failure(t0 + Duration::from_secs(15)),
            BreakerState::Closed
        );
        assert_eq!(breaker.recent_failures(), 1);
    }

    #[test]
    fn open_is_terminal() {
        let mut breaker = CircuitBreaker::new(0, Duration::from_secs(1));
        let t0 = Instant::now();
        assert_eq!(breaker.record_failure(t0), BreakerState::Open);
        assert_eq!(
            breaker.record_failure(t0 + Duration::from_secs(100)),
            BreakerState::Open
        );
        assert!(breaker.is_open());
    }
}
