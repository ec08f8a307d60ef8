//! Connection registry
//!
//! Tracks live client connections and which sessions each has joined. The
//! registry is the single broadcast point: events for a session go to every
//! connection currently joined to it. Membership is explicit; dropping a
//! connection removes it from every session it was in.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::delivery::ServerEvent;

/// Opaque handle for one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

struct Connection {
    user_id: String,
    tx: mpsc::Sender<ServerEvent>,
    sessions: HashSet<String>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, Connection>,
    /// session id -> member connections
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

/// Live connection and session-membership tracking.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and its outbound channel.
    pub async fn register(&self, user_id: &str, tx: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let id = ConnectionId(Uuid::new_v4().to_string());
        let mut inner = self.inner.write().await;
        inner.connections.insert(
            id.clone(),
            Connection {
                user_id: user_id.to_string(),
                tx,
                sessions: HashSet::new(),
            },
        );
        debug!(connection = %id, user = user_id, "connection registered");
        id
    }

    /// Join a connection to a session. Idempotent; joining twice is a no-op.
    ///
    /// Returns false when the connection is unknown.
    pub async fn join(&self, connection: &ConnectionId, session_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(conn) = inner.connections.get_mut(connection) else {
            return false;
        };
        conn.sessions.insert(session_id.to_string());
        inner
            .rooms
            .entry(session_id.to_string())
            .or_default()
            .insert(connection.clone());
        true
    }

    /// Remove a connection from a session. Unknown pairs are a no-op.
    pub async fn leave(&self, connection: &ConnectionId, session_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(conn) = inner.connections.get_mut(connection) {
            conn.sessions.remove(session_id);
        }
        if let Some(room) = inner.rooms.get_mut(session_id) {
            room.remove(connection);
            if room.is_empty() {
                inner.rooms.remove(session_id);
            }
        }
    }

    /// Drop a connection entirely, leaving every session it was in.
    pub async fn drop_connection(&self, connection: &ConnectionId) {
        let mut inner = self.inner.write().await;
        if let Some(conn) = inner.connections.remove(connection) {
            for session_id in conn.sessions {
                if let Some(room) = inner.rooms.get_mut(&session_id) {
                    room.remove(connection);
                    if room.is_empty() {
                        inner.rooms.remove(&session_id);
                    }
                }
            }
            debug!(connection = %connection, "connection dropped");
        }
    }

    /// User owning a connection, if it is still live.
    pub async fn user_of(&self, connection: &ConnectionId) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(connection)
            .map(|c| c.user_id.clone())
    }

    /// Sessions a connection has joined.
    pub async fn sessions_of(&self, connection: &ConnectionId) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(connection)
            .map(|c| c.sessions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of connections currently joined to a session.
    pub async fn member_count(&self, session_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner.rooms.get(session_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Send an event to every member of a session.
    ///
    /// Senders are cloned out under the read lock and the sends happen
    /// after it is released. Sends never block: a member whose buffer is
    /// full has the event dropped, so one stalled reader cannot hold up
    /// the rest of the session or the task publishing the event. A member
    /// whose channel is gone is skipped; its connection is reaped when the
    /// socket task exits.
    pub async fn broadcast(&self, session_id: &str, event: ServerEvent) {
        let targets: Vec<mpsc::Sender<ServerEvent>> = {
            let inner = self.inner.read().await;
            let Some(room) = inner.rooms.get(session_id) else {
                return;
            };
            room.iter()
                .filter_map(|id| inner.connections.get(id).map(|c| c.tx.clone()))
                .collect()
        };
        for tx in targets {
            if tx.try_send(event.clone()).is_err() {
                debug!(session = session_id, "member not keeping up, event dropped");
            }
        }
    }

    /// Send an event to one connection. Non-blocking; dropped when the
    /// connection's buffer is full or its channel is gone.
    pub async fn send_to(&self, connection: &ConnectionId, event: ServerEvent) {
        let tx = {
            let inner = self.inner.read().await;
            inner.connections.get(connection).map(|c| c.tx.clone())
        };
        if let Some(tx) = tx {
            if tx.try_send(event).is_err() {
                debug!(connection = %connection, "connection not keeping up, event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ServerEvent {
        ServerEvent::Typing {
            session_id: "s1".to_string(),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_register_and_user_of() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let conn = registry.register("u1", tx).await;
        assert_eq!(registry.user_of(&conn).await.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let conn = registry.register("u1", tx).await;
        assert!(registry.join(&conn, "s1").await);
        assert!(registry.join(&conn, "s1").await);
        assert_eq!(registry.member_count("s1").await, 1);
        assert_eq!(registry.sessions_of(&conn).await, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_join_unknown_connection_refused() {
        let registry = ConnectionRegistry::new();
        let unknown = ConnectionId("nope".to_string());
        assert!(!registry.join(&unknown, "s1").await);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = registry.register("u1", tx_a).await;
        let b = registry.register("u1", tx_b).await;
        registry.join(&a, "s1").await;
        registry.join(&b, "s1").await;

        registry.broadcast("s1", event()).await;
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_broadcast_skips_non_members() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let conn = registry.register("u1", tx).await;
        registry.join(&conn, "s1").await;

        registry.broadcast("s2", event()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_member_buffer_does_not_block_broadcast() {
        let registry = ConnectionRegistry::new();
        let (tx_stuck, _rx_stuck) = mpsc::channel(1);
        let (tx_live, mut rx_live) = mpsc::channel(8);
        let stuck = registry.register("u1", tx_stuck).await;
        let live = registry.register("u1", tx_live).await;
        registry.join(&stuck, "s1").await;
        registry.join(&live, "s1").await;

        // First event fills the stuck member's one-slot buffer. Later
        // broadcasts must still return and reach the reading member.
        registry.broadcast("s1", event()).await;
        tokio::time::timeout(
            std::time::Duration::from_millis(500),
            registry.broadcast("s1", event()),
        )
        .await
        .expect("broadcast must not block on a full member buffer");

        assert!(rx_live.recv().await.is_some());
        assert!(rx_live.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let conn = registry.register("u1", tx).await;
        registry.join(&conn, "s1").await;
        registry.leave(&conn, "s1").await;

        registry.broadcast("s1", event()).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.member_count("s1").await, 0);
    }

    #[tokio::test]
    async fn test_drop_connection_leaves_all_rooms() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let conn = registry.register("u1", tx).await;
        registry.join(&conn, "s1").await;
        registry.join(&conn, "s2").await;

        registry.drop_connection(&conn).await;
        assert_eq!(registry.member_count("s1").await, 0);
        assert_eq!(registry.member_count("s2").await, 0);
        assert!(registry.user_of(&conn).await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_single_connection() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = registry.register("u1", tx_a).await;
        let _b = registry.register("u2", tx_b).await;

        registry.send_to(&a, event()).await;
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
    }
}
