//! Per-client sliding-window rate limiter.
//!
//! Each identity keeps the instants of its accepted requests inside the
//! current window, so no rolling window ever holds more than `max_requests`
//! accepted requests. Rejected requests are not recorded.
//!
//! State is local to the worker process. With N workers and no sticky
//! routing, one client can be accepted up to `N × max_requests` times per
//! window across the whole service.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Accepted; `remaining` more requests fit in the current window.
    Allowed { remaining: u32 },
    /// Rejected; the oldest accepted request leaves the window after `retry_after`.
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Sliding-window limiter keyed by client identity.
pub struct RateLimiter<K = IpAddr> {
    windows: Mutex<HashMap<K, VecDeque<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Record a request for `key` if it fits in the window.
    pub fn allow(&self, key: &K) -> bool {
        self.check(key).is_allowed()
    }

    /// Like [`allow`](Self::allow), reporting remaining budget or retry delay.
    pub fn check(&self, key: &K) -> RateDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let hits = windows.entry(key.clone()).or_default();

        while hits
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() < self.max_requests as usize {
            hits.push_back(now);
            RateDecision::Allowed {
                remaining: self.max_requests - hits.len() as u32,
            }
        } else {
            let oldest = hits.front().copied().unwrap_or(now);
            RateDecision::Limited {
                retry_after: self.window.saturating_sub(now.duration_since(oldest)),
            }
        }
    }

    /// Forget identities with no request inside the window. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let before = windows.len();
        windows.retain(|_, hits| {
            hits.back()
                .is_some_and(|newest| now.duration_since(*newest) < self.window)
        });
        before - windows.len()
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.lock().expect("rate limiter mutex poisoned").len()
    }
}
