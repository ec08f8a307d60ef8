//! Outbound event delivery
//!
//! Everything the server pushes to clients goes through this module: the
//! [`ServerEvent`] wire vocabulary, the [`DedupCache`] that absorbs repeated
//! submissions, and the [`DeliveryChannel`] that manages streamed replies.
//!
//! Streamed replies use cumulative chunks: every `message_chunk` frame
//! carries the full text so far, so a client can drop or reorder frames and
//! still render correctly from the latest one it holds. Completion is
//! set-once; whichever of the success and timeout paths finalizes a stream
//! first wins and the loser becomes a no-op.

mod dedup;

pub use dedup::DedupCache;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CareError, Result};
use crate::sessions::{ChatMessage, ConnectionRegistry, Session};

/// Events pushed from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Joined a session; carries the full history for replay
    Joined {
        session_id: String,
        session: Session,
        messages: Vec<ChatMessage>,
    },
    /// Join was refused
    JoinError { session_id: String, reason: String },
    /// Out-of-band failure notice
    Error { message: String },
    /// A finished message (user echo or batch reply)
    Message { message: ChatMessage },
    /// Assistant typing indicator
    Typing { session_id: String, active: bool },
    /// Human-readable progress line shown while a reply is prepared
    Status { session_id: String, text: String },
    /// A streamed reply is starting; carries the reply's shell so clients
    /// can render the bubble (sender, timestamp) before the first chunk
    MessageStart { message: ChatMessage },
    /// Streamed reply progress; `text` is the full content so far
    MessageChunk {
        id: String,
        session_id: String,
        text: String,
        done: bool,
    },
    /// Final form of a streamed reply
    MessageComplete { message: ChatMessage },
}

struct InFlight {
    /// Shell of the reply as announced in `message_start`
    shell: ChatMessage,
    /// Cumulative text accumulated so far
    text: String,
}

/// Fan-out point for everything the server sends.
///
/// Owns the duplicate-submission cache, the table of in-flight streamed
/// replies, and a cache of recently finalized message ids that absorbs
/// late chunks and duplicate completions. Broadcasts go through the
/// [`ConnectionRegistry`].
pub struct DeliveryChannel {
    registry: Arc<ConnectionRegistry>,
    dedup: DedupCache,
    finalized: DedupCache,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl DeliveryChannel {
    pub fn new(registry: Arc<ConnectionRegistry>, dedup_ttl: Duration, dedup_capacity: usize) -> Self {
        Self {
            registry,
            dedup: DedupCache::new(dedup_ttl, dedup_capacity),
            finalized: DedupCache::new(dedup_ttl, dedup_capacity),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a submission should be processed. False means an identical
    /// message from the same user and session arrived within the TTL.
    pub fn should_process(&self, user_id: &str, session_id: &str, text: &str) -> bool {
        self.dedup
            .check_and_record(&DedupCache::fingerprint(user_id, session_id, text))
    }

    /// Broadcast a finished message to a session's members.
    pub async fn send_message(&self, message: &ChatMessage) {
        self.registry
            .broadcast(
                &message.session_id,
                ServerEvent::Message {
                    message: message.clone(),
                },
            )
            .await;
    }

    /// Toggle the typing indicator.
    pub async fn typing(&self, session_id: &str, active: bool) {
        self.registry
            .broadcast(
                session_id,
                ServerEvent::Typing {
                    session_id: session_id.to_string(),
                    active,
                },
            )
            .await;
    }

    /// Push a progress line.
    pub async fn status(&self, session_id: &str, text: &str) {
        self.registry
            .broadcast(
                session_id,
                ServerEvent::Status {
                    session_id: session_id.to_string(),
                    text: text.to_string(),
                },
            )
            .await;
    }

    /// Open a streamed reply announced by its shell message.
    ///
    /// Chunks and the final completion are keyed by `shell.id`, so the
    /// frames a client sees all carry the id the reply is persisted under.
    pub async fn begin(&self, shell: &ChatMessage) {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).insert(
            shell.id.clone(),
            InFlight {
                shell: shell.clone(),
                text: String::new(),
            },
        );
        self.registry
            .broadcast(
                &shell.session_id,
                ServerEvent::MessageStart {
                    message: shell.clone(),
                },
            )
            .await;
    }

    /// Publish stream progress. `delta` is appended to the stream's
    /// accumulator and the full text so far goes out on the wire.
    ///
    /// A chunk arriving after completion is dropped silently; an id that
    /// was never started is an error.
    pub async fn chunk(&self, id: &str, delta: &str) -> Result<()> {
        let (session_id, text) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match in_flight.get_mut(id) {
                Some(entry) => {
                    entry.text.push_str(delta);
                    (entry.shell.session_id.clone(), entry.text.clone())
                }
                None if self.finalized.contains(id) => {
                    debug!(stream = id, "chunk after completion dropped");
                    return Ok(());
                }
                None => {
                    return Err(CareError::Delivery(format!("unknown stream {}", id)));
                }
            }
        };
        self.registry
            .broadcast(
                &session_id,
                ServerEvent::MessageChunk {
                    id: id.to_string(),
                    session_id: session_id.clone(),
                    text,
                    done: false,
                },
            )
            .await;
        Ok(())
    }

    /// Finalize a streamed reply with its persisted form.
    ///
    /// Returns true if this call performed the completion, false if the
    /// stream was already finished (the message is then left untouched).
    pub async fn complete(&self, id: &str, message: &ChatMessage) -> bool {
        let session_id = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match in_flight.remove(id) {
                Some(entry) if self.finalized.check_and_record(id) => entry.shell.session_id,
                _ => return false,
            }
        };
        self.registry
            .broadcast(
                &session_id,
                ServerEvent::MessageChunk {
                    id: id.to_string(),
                    session_id: session_id.clone(),
                    text: message.text.clone(),
                    done: true,
                },
            )
            .await;
        self.registry
            .broadcast(
                &session_id,
                ServerEvent::MessageComplete {
                    message: message.clone(),
                },
            )
            .await;
        true
    }

    /// Replay in-flight streams of a session to one late-joining connection.
    ///
    /// The joiner receives a `message_start` and the current cumulative
    /// chunk for each stream still running, then follows along live.
    pub async fn replay_for(
        &self,
        session_id: &str,
        tx: &tokio::sync::mpsc::Sender<ServerEvent>,
    ) {
        let snapshots: Vec<(ChatMessage, String)> = {
            let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight
                .values()
                .filter(|e| e.shell.session_id == session_id)
                .map(|e| (e.shell.clone(), e.text.clone()))
                .collect()
        };
        for (shell, text) in snapshots {
            let id = shell.id.clone();
            let _ = tx.send(ServerEvent::MessageStart { message: shell }).await;
            if !text.is_empty() {
                let _ = tx
                    .send(ServerEvent::MessageChunk {
                        id,
                        session_id: session_id.to_string(),
                        text,
                        done: false,
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel() -> (Arc<ConnectionRegistry>, DeliveryChannel) {
        let registry = Arc::new(ConnectionRegistry::new());
        let delivery = DeliveryChannel::new(registry.clone(), Duration::from_secs(60), 100);
        (registry, delivery)
    }

    async fn join_member(
        registry: &ConnectionRegistry,
        session_id: &str,
    ) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(64);
        let conn = registry.register("u1", tx).await;
        registry.join(&conn, session_id).await;
        rx
    }

    #[tokio::test]
    async fn test_stream_lifecycle() {
        let (registry, delivery) = channel();
        let mut rx = join_member(&registry, "s1").await;

        let shell = ChatMessage::streaming("s1", "u1");
        delivery.begin(&shell).await;
        delivery.chunk(&shell.id, "Drink").await.unwrap();
        delivery.chunk(&shell.id, " plenty of fluids").await.unwrap();
        let mut final_msg = shell.clone();
        final_msg.is_streaming = false;
        final_msg.text = "Drink plenty of fluids and rest.".to_string();
        assert!(delivery.complete(&shell.id, &final_msg).await);

        match rx.recv().await.unwrap() {
            ServerEvent::MessageStart { message } => {
                assert!(message.is_streaming);
                assert!(message.text.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerEvent::MessageChunk { text, done, .. } => {
                assert_eq!(text, "Drink");
                assert!(!done);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // Cumulative: the second frame carries everything sent so far.
        match rx.recv().await.unwrap() {
            ServerEvent::MessageChunk { text, .. } => assert_eq!(text, "Drink plenty of fluids"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerEvent::MessageChunk { text, done, .. } => {
                assert_eq!(text, "Drink plenty of fluids and rest.");
                assert!(done);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerEvent::MessageComplete { .. }
        ));
    }

    #[tokio::test]
    async fn test_frames_share_the_persisted_message_id() {
        let (registry, delivery) = channel();
        let mut rx = join_member(&registry, "s1").await;

        let shell = ChatMessage::streaming("s1", "u1");
        delivery.begin(&shell).await;
        delivery.chunk(&shell.id, "answer").await.unwrap();
        let mut final_msg = shell.clone();
        final_msg.is_streaming = false;
        final_msg.text = "answer".to_string();
        delivery.complete(&shell.id, &final_msg).await;

        // Every frame of the stream is keyed by the id the reply is
        // ultimately persisted under.
        match rx.recv().await.unwrap() {
            ServerEvent::MessageStart { message } => assert_eq!(message.id, shell.id),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerEvent::MessageChunk { id, .. } => assert_eq!(id, shell.id),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerEvent::MessageChunk { id, done, .. } => {
                assert_eq!(id, shell.id);
                assert!(done);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerEvent::MessageComplete { message } => assert_eq!(message.id, shell.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_is_set_once() {
        let (_registry, delivery) = channel();
        let shell = ChatMessage::streaming("s1", "u1");
        delivery.begin(&shell).await;
        let msg = ChatMessage::bot("s1", "u1", "done");
        assert!(delivery.complete(&shell.id, &msg).await);
        assert!(!delivery.complete(&shell.id, &msg).await);
    }

    #[tokio::test]
    async fn test_chunk_after_completion_is_dropped() {
        let (registry, delivery) = channel();
        let shell = ChatMessage::streaming("s1", "u1");
        delivery.begin(&shell).await;
        let msg = ChatMessage::bot("s1", "u1", "done");
        delivery.complete(&shell.id, &msg).await;

        let mut rx = join_member(&registry, "s1").await;
        delivery.chunk(&shell.id, "late").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chunk_unknown_stream_errors() {
        let (_registry, delivery) = channel();
        let err = delivery.chunk("nope", "text").await.unwrap_err();
        assert!(matches!(err, CareError::Delivery(_)));
    }

    #[tokio::test]
    async fn test_replay_for_late_joiner() {
        let (_registry, delivery) = channel();
        let shell = ChatMessage::streaming("s1", "u1");
        delivery.begin(&shell).await;
        delivery.chunk(&shell.id, "partial answer").await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        delivery.replay_for("s1", &tx).await;

        match rx.recv().await.unwrap() {
            ServerEvent::MessageStart { message } => {
                assert_eq!(message.id, shell.id);
                assert!(message.is_streaming);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerEvent::MessageChunk { text, done, .. } => {
                assert_eq!(text, "partial answer");
                assert!(!done);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replay_skips_other_sessions() {
        let (_registry, delivery) = channel();
        delivery.begin(&ChatMessage::streaming("s1", "u1")).await;

        let (tx, mut rx) = mpsc::channel(8);
        delivery.replay_for("s2", &tx).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_should_process_absorbs_duplicates() {
        let (_registry, delivery) = channel();
        assert!(delivery.should_process("u1", "s1", "hello"));
        assert!(!delivery.should_process("u1", "s1", "hello"));
        assert!(delivery.should_process("u1", "s2", "hello"));
    }

    #[test]
    fn test_server_event_wire_tags() {
        let event = ServerEvent::Typing {
            session_id: "s1".to_string(),
            active: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "typing");

        let event = ServerEvent::MessageChunk {
            id: "m1".to_string(),
            session_id: "s1".to_string(),
            text: "hi".to_string(),
            done: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_chunk");
        assert_eq!(json["done"], false);

        let event = ServerEvent::MessageStart {
            message: ChatMessage::streaming("s1", "u1"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_start");
        assert_eq!(json["message"]["is_streaming"], true);
        assert_eq!(json["message"]["text"], "");
    }
}
