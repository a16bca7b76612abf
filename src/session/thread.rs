//! Per-user session records and their store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, MutexGuard};

use super::history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};
use crate::llm::ConversationHandle;

/// Mutable state of a session, reachable only through [`Session::lock`].
#[derive(Debug)]
pub struct SessionState {
    conversation: ConversationHandle,
    history: BoundedHistory,
}

impl SessionState {
    fn new(history_capacity: usize) -> Self {
        Self {
            conversation: ConversationHandle::new(),
            history: BoundedHistory::new(history_capacity),
        }
    }

    /// The upstream conversation handle, passed through to the model client.
    pub fn conversation_mut(&mut self) -> &mut ConversationHandle {
        &mut self.conversation
    }

    #[must_use]
    pub fn conversation(&self) -> &ConversationHandle {
        &self.conversation
    }

    #[must_use]
    pub fn history(&self) -> &BoundedHistory {
        &self.history
    }

    pub fn record_user_message(&mut self, text: &str) {
        self.history.push(format!("User: {text}"));
    }

    pub fn record_bot_message(&mut self, text: &str) {
        self.history.push(format!("Bot: {text}"));
    }

    /// Append a full user/bot exchange to the recent-message log.
    pub fn record_turn(&mut self, user_text: &str, bot_text: &str) {
        self.record_user_message(user_text);
        self.record_bot_message(bot_text);
    }
}

/// A single user's conversation.
///
/// Cloning is cheap and yields a handle to the same underlying session.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    user_id: String,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(user_id: String, history_capacity: usize) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                user_id,
                state: Mutex::new(SessionState::new(history_capacity)),
            }),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    /// Lock the session for a turn. Turns for the same user run one at a time.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().await
    }

    /// Snapshot of the recent-message log, oldest first.
    pub async fn history(&self) -> Vec<String> {
        self.lock().await.history().to_vec()
    }

    /// Whether both handles refer to the same session.
    #[must_use]
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Thread-safe map from user id to [`Session`].
///
/// Sessions are created on first contact and live for the lifetime of the
/// store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    history_capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store whose sessions keep the default number of messages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    #[must_use]
    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                history_capacity,
            }),
        }
    }

    /// Get a session by user id.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<Session> {
        let guard = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(user_id).cloned()
    }

    /// Get the session for `user_id`, creating an empty one on first contact.
    #[must_use]
    pub fn get_or_create(&self, user_id: &str) -> Session {
        // Try read-only first
        if let Some(session) = self.get(user_id) {
            return session;
        }

        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id = %user_id, "Created new session");
                Session::new(user_id.to_string(), self.inner.history_capacity)
            })
            .clone()
    }

    /// Get the number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        let first = store.get_or_create("u1");
        let second = store.get_or_create("u1");

        assert!(first.ptr_eq(&second));
        assert_eq!(first.user_id(), "u1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_distinct_users_get_distinct_sessions() {
        let store = SessionStore::new();

        let a = store.get_or_create("alice");
        let b = store.get_or_create("bob");

        assert!(!a.ptr_eq(&b));
        assert_eq!(store.len(), 2);
        assert!(store.get("carol").is_none());
    }

    #[test]
    fn test_concurrent_first_contact_creates_one_session() {
        let store = SessionStore::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.get_or_create("racer"))
            })
            .collect();
        let sessions: Vec<Session> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(store.len(), 1);
        assert!(sessions.iter().all(|s| s.ptr_eq(&sessions[0])));
    }

    #[tokio::test]
    async fn test_new_session_is_empty() {
        let store = SessionStore::new();
        let session = store.get_or_create("u1");

        let state = session.lock().await;
        assert!(state.history().is_empty());
        assert!(state.conversation().is_empty());
        assert_eq!(state.history().capacity(), DEFAULT_HISTORY_CAPACITY);
    }

    #[tokio::test]
    async fn test_record_turn_prefixes_entries() {
        let store = SessionStore::new();
        let session = store.get_or_create("u1");

        session.lock().await.record_turn("hello", "hi there");

        assert_eq!(session.history().await, ["User: hello", "Bot: hi there"]);
    }

    #[tokio::test]
    async fn test_record_turn_respects_store_capacity() {
        let store = SessionStore::with_history_capacity(4);
        let session = store.get_or_create("u1");

        {
            let mut state = session.lock().await;
            for i in 0..3 {
                state.record_turn(&format!("q{i}"), &format!("a{i}"));
            }
        }

        assert_eq!(
            session.history().await,
            ["User: q1", "Bot: a1", "User: q2", "Bot: a2"]
        );
    }
}
