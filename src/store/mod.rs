//! Session and message persistence
//!
//! Defines the [`SessionStore`] trait plus the in-memory implementation used
//! by the server. The store owns message ordering: `append_message` assigns
//! each message a per-session sequence number, and `list_messages` returns
//! history sorted by it. Insertion order, not timestamps, decides history.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{CareError, Result};
use crate::sessions::{ChatMessage, Session};

/// Partial update applied to a session.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    pub fn title(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn touched() -> Self {
        Self {
            last_activity: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn with_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity = Some(at);
        self
    }
}

/// Storage backend for sessions and their messages.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session owned by `user_id`.
    async fn create_session(&self, user_id: &str) -> Result<Session>;

    /// Fetch a session by id.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    /// All sessions owned by `user_id`, most recently active first.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Apply a partial update. Fails with [`CareError::NotFound`] when the
    /// session does not exist.
    async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<Session>;

    /// Remove a session and its messages.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Persist a message, assigning its sequence number. Returns the stored
    /// copy with `seq` populated.
    async fn append_message(&self, message: ChatMessage) -> Result<ChatMessage>;

    /// Full history of a session in sequence order.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// The last `limit` messages of a session in sequence order.
    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;
}

#[derive(Default)]
struct MemoryStoreInner {
    sessions: HashMap<String, Session>,
    messages: HashMap<String, Vec<ChatMessage>>,
    next_seq: HashMap<String, u64>,
}

/// In-memory [`SessionStore`].
///
/// Backed by a single `RwLock`; writes are short and never held across
/// await points into foreign code.
///
/// # Example
/// ```
/// use sonarcare::store::{MemoryStore, SessionStore};
/// use sonarcare::sessions::ChatMessage;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let session = store.create_session("u1").await.unwrap();
/// let stored = store
///     .append_message(ChatMessage::user(&session.id, "u1", "hello"))
///     .await
///     .unwrap();
/// assert_eq!(stored.seq, Some(0));
/// # });
/// ```
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, user_id: &str) -> Result<Session> {
        let session = Session::new(user_id);
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(session_id).cloned())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<Session> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CareError::NotFound(format!("session {}", session_id)))?;
        if let Some(title) = update.title {
            session.title = Some(title);
        }
        if let Some(summary) = update.summary {
            session.summary = Some(summary);
        }
        if let Some(at) = update.last_activity {
            session.last_activity = at;
        }
        Ok(session.clone())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.sessions.remove(session_id);
        inner.messages.remove(session_id);
        inner.next_seq.remove(session_id);
        Ok(())
    }

    async fn append_message(&self, mut message: ChatMessage) -> Result<ChatMessage> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(&message.session_id) {
            return Err(CareError::NotFound(format!(
                "session {}",
                message.session_id
            )));
        }
        let seq = inner
            .next_seq
            .entry(message.session_id.clone())
            .or_insert(0);
        message.seq = Some(*seq);
        *seq += 1;
        inner
            .messages
            .entry(message.session_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let inner = self.inner.read().await;
        let mut messages = inner.messages.get(session_id).cloned().unwrap_or_default();
        messages.sort_by_key(|m| m.seq);
        Ok(messages)
    }

    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let mut messages = self.list_messages(session_id).await?;
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let store = MemoryStore::new();
        let session = store.create_session("u1").await.unwrap();
        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.user_id, "u1");
        assert!(store.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sessions_ordered_by_activity() {
        let store = MemoryStore::new();
        let a = store.create_session("u1").await.unwrap();
        let b = store.create_session("u1").await.unwrap();
        let _other = store.create_session("u2").await.unwrap();

        store
            .update_session(&a.id, SessionUpdate::touched())
            .await
            .unwrap();

        let sessions = store.list_sessions("u1").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, a.id);
        assert_eq!(sessions[1].id, b.id);
    }

    #[tokio::test]
    async fn test_update_session_title_set_once_semantics() {
        let store = MemoryStore::new();
        let session = store.create_session("u1").await.unwrap();
        let updated = store
            .update_session(&session.id, SessionUpdate::title("Back pain"))
            .await
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("Back pain"));

        let err = store
            .update_session("missing", SessionUpdate::title("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_append_assigns_monotonic_seq() {
        let store = MemoryStore::new();
        let session = store.create_session("u1").await.unwrap();

        for i in 0..5 {
            let stored = store
                .append_message(ChatMessage::user(&session.id, "u1", &format!("m{}", i)))
                .await
                .unwrap();
            assert_eq!(stored.seq, Some(i));
        }

        let messages = store.list_messages(&session.id).await.unwrap();
        let seqs: Vec<u64> = messages.iter().filter_map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_seq_counters_independent_per_session() {
        let store = MemoryStore::new();
        let a = store.create_session("u1").await.unwrap();
        let b = store.create_session("u1").await.unwrap();

        store
            .append_message(ChatMessage::user(&a.id, "u1", "one"))
            .await
            .unwrap();
        let first_in_b = store
            .append_message(ChatMessage::user(&b.id, "u1", "two"))
            .await
            .unwrap();
        assert_eq!(first_in_b.seq, Some(0));
    }

    #[tokio::test]
    async fn test_append_to_missing_session_fails() {
        let store = MemoryStore::new();
        let err = store
            .append_message(ChatMessage::user("missing", "u1", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_recent_messages_window() {
        let store = MemoryStore::new();
        let session = store.create_session("u1").await.unwrap();
        for i in 0..10 {
            store
                .append_message(ChatMessage::user(&session.id, "u1", &format!("m{}", i)))
                .await
                .unwrap();
        }
        let recent = store.recent_messages(&session.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "m7");
        assert_eq!(recent[2].text, "m9");
    }

    #[tokio::test]
    async fn test_delete_session_removes_messages() {
        let store = MemoryStore::new();
        let session = store.create_session("u1").await.unwrap();
        store
            .append_message(ChatMessage::user(&session.id, "u1", "x"))
            .await
            .unwrap();
        store.delete_session(&session.id).await.unwrap();
        assert!(store.get_session(&session.id).await.unwrap().is_none());
        assert!(store.list_messages(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ordering_survives_equal_timestamps() {
        let store = MemoryStore::new();
        let session = store.create_session("u1").await.unwrap();
        let ts = Utc::now();
        for text in ["first", "second", "third"] {
            let mut msg = ChatMessage::user(&session.id, "u1", text);
            msg.timestamp = ts;
            store.append_message(msg).await.unwrap();
        }
        let messages = store.list_messages(&session.id).await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
