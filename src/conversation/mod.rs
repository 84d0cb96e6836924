//! Per-session conversation history.
//!
//! History is keyed by an explicit session id that the client sends
//! (`x-session-id` header or `session_id` body field) or that the gateway
//! issues. Sessions live in worker memory only: a session is visible to the
//! worker that created it, and is lost when that worker exits.

pub mod store;

pub use store::{ConversationStore, SessionId};
