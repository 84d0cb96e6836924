//! Bounded in-memory session store.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::ConversationConfig;
use crate::upstream::ConversationTurn;

/// Longest session id accepted from a client.
const MAX_SESSION_ID_LEN: usize = 128;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Issue a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied id if it is non-empty, short and printable ASCII.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw.bytes().all(|b| b.is_ascii_graphic());
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Session {
    turns: VecDeque<ConversationTurn>,
    last_used: Instant,
}

/// Session-scoped turn history with per-session and global bounds.
pub struct ConversationStore {
    sessions: DashMap<SessionId, Session>,
    max_turns: usize,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl ConversationStore {
    pub fn new(config: &ConversationConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            // Whole exchanges only: history never opens with an assistant turn.
            max_turns: config.max_turns.max(2) & !1,
            max_sessions: config.max_sessions.max(1),
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
        }
    }

    /// Turns recorded so far for `id`, oldest first. Unknown or expired
    /// sessions yield an empty history.
    pub fn history(&self, id: &SessionId) -> Vec<ConversationTurn> {
        match self.sessions.get(id) {
            Some(session) if session.last_used.elapsed() < self.idle_ttl => {
                session.turns.iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Append a completed exchange to the session, creating it if needed.
    pub fn record_exchange(&self, id: &SessionId, prompt: &str, answer: &str) {
        if !self.sessions.contains_key(id) && self.sessions.len() >= self.max_sessions {
            self.purge_expired();
            if self.sessions.len() >= self.max_sessions {
                self.evict_least_recent();
            }
        }

        let now = Instant::now();
        let mut session = self.sessions.entry(id.clone()).or_insert_with(|| Session {
            turns: VecDeque::new(),
            last_used: now,
        });
        if now.duration_since(session.last_used) >= self.idle_ttl {
            session.turns.clear();
        }
        session.turns.push_back(ConversationTurn::user(prompt));
        session.turns.push_back(ConversationTurn::assistant(answer));
        while session.turns.len() > self.max_turns {
            session.turns.pop_front();
        }
        session.last_used = now;
    }

    /// Drop sessions idle longer than the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_used.elapsed() < self.idle_ttl);
        before - self.sessions.len()
    }

    /// Number of sessions currently held.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_least_recent(&self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().last_used)
            .map(|entry| entry.key().clone());
        if let Some(id) = oldest {
            self.sessions.remove(&id);
            tracing::debug!(session = %id, "Evicted least recently used session");
        }
    }
}
