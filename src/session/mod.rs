//! Session and conversation log management.
//!
//! Sessions are identified by a client-supplied string and hold the ordered
//! message log that is replayed to the provider on every turn. The first
//! message of every log is the system prompt for the session's mode; it is
//! the only message ever changed in place.
//!
//! # Architecture
//!
//! - [`SessionStore`]: the interface the gateway and HTTP handlers depend on
//! - [`InMemorySessionStore`]: process-local store with per-session locking
//!   and an optional [`EvictionPolicy`]
//!
//! # Example
//!
//! ```rust
//! use mode_chat::llm::MessageRole;
//! use mode_chat::session::{InMemorySessionStore, SessionStore};
//!
//! let store = InMemorySessionStore::new();
//! assert!(store.ensure("abc", "general"));
//! store.append("abc", MessageRole::User, "Hello!".into()).unwrap();
//!
//! let export = store.export("abc").unwrap();
//! assert_eq!(export.messages.len(), 1);
//! ```

mod thread;

pub use thread::{EvictionPolicy, InMemorySessionStore, Session};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::llm::{Message, MessageRole};

/// Errors returned by session store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// No session exists for the given id.
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// A session's conversation, minus its system prompt, as handed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ChatExport {
    /// Session the messages belong to.
    pub session_id: String,
    /// When the export was produced.
    pub timestamp: DateTime<Utc>,
    /// User and assistant messages in append order.
    pub messages: Vec<Message>,
}

/// Storage for chat sessions.
///
/// Implementations must keep index 0 of every log a system message and must
/// make each operation atomic with respect to other operations on the same
/// session.
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Create the session with `mode`'s prompt if it does not exist.
    ///
    /// Returns `true` when a session was created.
    fn ensure(&self, session_id: &str, mode: &str) -> bool;

    /// Append a message to an existing session.
    fn append(
        &self,
        session_id: &str,
        role: MessageRole,
        content: String,
    ) -> Result<(), SessionError>;

    /// Switch the session's system prompt to `mode`, creating the session if
    /// needed. Prior messages are kept.
    ///
    /// Returns `true` when a session was created.
    fn set_mode(&self, session_id: &str, mode: &str) -> bool;

    /// Full log, system prompt included.
    fn messages(&self, session_id: &str) -> Result<Vec<Message>, SessionError>;

    /// Log without the system prompt, stamped with the current time.
    fn export(&self, session_id: &str) -> Result<ChatExport, SessionError>;

    /// Number of live sessions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions idle past the store's timeout. Returns how many were removed.
    fn evict_expired(&self) -> usize;
}
