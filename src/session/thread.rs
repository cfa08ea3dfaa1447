//! Conversation thread and in-memory session storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{ChatExport, SessionError, SessionStore};
use crate::llm::{Message, MessageRole};
use crate::prompts;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A single conversation session.
///
/// Cloning is cheap and yields a handle to the same log.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Client-supplied identifier.
    id: String,
    /// Conversation messages, system prompt first.
    messages: RwLock<Vec<Message>>,
    /// Last activity time.
    last_activity: RwLock<DateTime<Utc>>,
}

impl Session {
    /// Create a session whose log holds only the given system prompt.
    fn new(id: String, system_prompt: &str) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                id,
                messages: RwLock::new(vec![Message::system(system_prompt)]),
                last_activity: RwLock::new(now),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Get the last time the session was read for a turn or mutated.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        *read(&self.inner.last_activity)
    }

    /// Replace the system prompt at index 0, leaving the rest of the log alone.
    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        let mut guard = write(&self.inner.messages);
        let prompt = prompt.into();
        match guard.first_mut() {
            Some(first) if first.role == MessageRole::System => first.content = prompt,
            _ => guard.insert(0, Message::system(prompt)),
        }
        drop(guard);
        self.touch();
    }

    /// Add a message to the conversation.
    pub fn add_message(&self, message: Message) {
        let mut guard = write(&self.inner.messages);
        guard.push(message);
        drop(guard);
        self.touch();
    }

    /// Get all messages, system prompt included.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        let messages = read(&self.inner.messages).clone();
        self.touch();
        messages
    }

    /// Get the conversation without the system prompt.
    #[must_use]
    pub fn history(&self) -> Vec<Message> {
        read(&self.inner.messages)
            .iter()
            .skip(1)
            .cloned()
            .collect()
    }

    /// Get the number of messages, system prompt included.
    #[must_use]
    pub fn message_count(&self) -> usize {
        read(&self.inner.messages).len()
    }

    /// Update the last activity timestamp.
    fn touch(&self) {
        *write(&self.inner.last_activity) = Utc::now();
    }

    /// Check if the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        let last = self.last_activity();
        // Negative durations (clock skew) never count as expired.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

/// Bounds on how many sessions the store keeps and for how long.
///
/// The default keeps everything for the life of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// When set, creating a session beyond this count first evicts the least
    /// recently active one.
    pub max_sessions: Option<usize>,
    /// When set, [`SessionStore::evict_expired`] drops sessions idle longer
    /// than this.
    pub idle_timeout: Option<Duration>,
}

/// Thread-safe in-memory session store.
///
/// The map lock is only held to look up, insert or remove sessions; each
/// session's log has its own lock, so turns on different sessions never wait
/// on each other.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    policy: EvictionPolicy,
}

impl InMemorySessionStore {
    /// Create an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that applies `policy`.
    #[must_use]
    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                sessions: RwLock::new(HashMap::new()),
                policy,
            }),
        }
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        read(&self.inner.sessions).get(id).cloned()
    }

    /// Insert a new session unless one exists. Returns `true` when inserted.
    fn create_if_absent(&self, id: &str, mode: &str) -> bool {
        let mut guard = write(&self.inner.sessions);
        if guard.contains_key(id) {
            return false;
        }

        if let Some(max) = self.inner.policy.max_sessions {
            while guard.len() >= max.max(1) {
                let Some(oldest) = guard
                    .values()
                    .min_by_key(|s| s.last_activity())
                    .map(|s| s.id().to_string())
                else {
                    break;
                };
                guard.remove(&oldest);
                tracing::info!(
                    name: "session.evicted",
                    session_id = %oldest,
                    reason = "capacity",
                    "Evicted least recently active session"
                );
            }
        }

        guard.insert(id.to_string(), Session::new(id.to_string(), prompts::lookup(mode)));
        tracing::debug!(session_id = %id, mode = %mode, "Created session");
        true
    }

    fn require(&self, id: &str) -> Result<Session, SessionError> {
        self.get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }
}

impl SessionStore for InMemorySessionStore {
    fn ensure(&self, session_id: &str, mode: &str) -> bool {
        if read(&self.inner.sessions).contains_key(session_id) {
            return false;
        }
        self.create_if_absent(session_id, mode)
    }

    fn append(
        &self,
        session_id: &str,
        role: MessageRole,
        content: String,
    ) -> Result<(), SessionError> {
        let session = self.require(session_id)?;
        session.add_message(Message::new(role, content));
        tracing::trace!(
            session_id = %session_id,
            role = ?role,
            message_count = session.message_count(),
            "Appended message"
        );
        Ok(())
    }

    fn set_mode(&self, session_id: &str, mode: &str) -> bool {
        if let Some(session) = self.get(session_id) {
            session.set_system_prompt(prompts::lookup(mode));
            tracing::debug!(session_id = %session_id, mode = %mode, "Updated session mode");
            return false;
        }
        if self.create_if_absent(session_id, mode) {
            return true;
        }
        // Another caller created it between the lookup and the insert.
        if let Some(session) = self.get(session_id) {
            session.set_system_prompt(prompts::lookup(mode));
        }
        false
    }

    fn messages(&self, session_id: &str) -> Result<Vec<Message>, SessionError> {
        Ok(self.require(session_id)?.messages())
    }

    fn export(&self, session_id: &str) -> Result<ChatExport, SessionError> {
        let session = self.require(session_id)?;
        Ok(ChatExport {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            messages: session.history(),
        })
    }

    fn len(&self) -> usize {
        read(&self.inner.sessions).len()
    }

    fn evict_expired(&self) -> usize {
        let Some(timeout) = self.inner.policy.idle_timeout else {
            return 0;
        };
        let mut guard = write(&self.inner.sessions);
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }
}
