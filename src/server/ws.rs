//! WebSocket transport
//!
//! One socket per client. The token is verified before the upgrade is
//! accepted; afterwards the socket carries JSON [`ClientEvent`] frames in
//! and [`ServerEvent`] frames out. Outbound events flow through a
//! per-connection channel registered with the [`ConnectionRegistry`], so
//! broadcasts and direct sends share one path onto the wire.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::delivery::ServerEvent;
use crate::error::CareError;
use crate::sessions::ConnectionId;

use super::AppState;

/// Outbound channel depth per connection. A client that stops reading has
/// this much slack before broadcasts to it start being dropped.
const OUTBOUND_BUFFER: usize = 256;

/// Events accepted from clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Join { session_id: String },
    Leave { session_id: String },
    Message { session_id: String, text: String },
}

#[derive(Deserialize)]
pub struct WsParams {
    #[serde(default)]
    token: String,
}

/// GET /ws — verify the token, then upgrade.
pub async fn handle_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let user_id = match state.identity.verify(&params.token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            debug!(error = %e, "websocket auth failed");
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid token" })),
            )
                .into_response();
        }
    };
    ws.on_upgrade(move |socket| client_loop(socket, state, user_id))
}

async fn client_loop(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sink, mut source) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);
    let conn = state.connections.register(&user_id, tx.clone()).await;

    // Writer: drain the outbound channel onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "outbound event serialization failed");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader: events are handled in arrival order, so a session's replies
    // land in the order its messages were sent.
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(_) => {
                state
                    .connections
                    .send_to(
                        &conn,
                        ServerEvent::Error {
                            message: "unrecognized event".to_string(),
                        },
                    )
                    .await;
                continue;
            }
        };
        handle_event(&state, &conn, &user_id, &tx, event).await;
    }

    state.connections.drop_connection(&conn).await;
    writer.abort();
}

async fn handle_event(
    state: &AppState,
    conn: &ConnectionId,
    user_id: &str,
    tx: &mpsc::Sender<ServerEvent>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::Join { session_id } => {
            handle_join(state, conn, user_id, tx, &session_id).await;
        }
        ClientEvent::Leave { session_id } => {
            state.connections.leave(conn, &session_id).await;
        }
        ClientEvent::Message { session_id, text } => {
            if let Err(e) = state
                .orchestrator
                .handle_message(&session_id, user_id, &text)
                .await
            {
                // Input errors go only to the submitting connection.
                state
                    .connections
                    .send_to(
                        conn,
                        ServerEvent::Error {
                            message: public_error_text(&e),
                        },
                    )
                    .await;
            }
        }
    }
}

/// Authorize and perform a session join: the session must exist and belong
/// to the connecting user. Success replays stored history and any stream
/// still in flight.
async fn handle_join(
    state: &AppState,
    conn: &ConnectionId,
    user_id: &str,
    tx: &mpsc::Sender<ServerEvent>,
    session_id: &str,
) {
    let refusal = |reason: &str| ServerEvent::JoinError {
        session_id: session_id.to_string(),
        reason: reason.to_string(),
    };

    let session = match state.store.get_session(session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            state.connections.send_to(conn, refusal("session not found")).await;
            return;
        }
        Err(e) => {
            warn!(error = %e, "session lookup failed during join");
            state.connections.send_to(conn, refusal("session unavailable")).await;
            return;
        }
    };
    if session.user_id != user_id {
        state
            .connections
            .send_to(conn, refusal("session belongs to another user"))
            .await;
        return;
    }

    state.connections.join(conn, session_id).await;

    let messages = match state.store.list_messages(session_id).await {
        Ok(messages) => messages,
        Err(e) => {
            warn!(error = %e, "history load failed during join");
            Vec::new()
        }
    };
    state
        .connections
        .send_to(
            conn,
            ServerEvent::Joined {
                session_id: session_id.to_string(),
                session,
                messages,
            },
        )
        .await;

    // Late joiner catch-up for replies still streaming.
    state.delivery.replay_for(session_id, tx).await;
}

/// Text safe to put on the wire. Internal detail stays in the logs.
fn public_error_text(e: &CareError) -> String {
    match e {
        CareError::InvalidInput(msg) => msg.clone(),
        CareError::NotFound(_) => "session not found".to_string(),
        CareError::Unauthorized(_) => "not allowed".to_string(),
        _ => "internal error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_parse() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type": "join", "session_id": "s1"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Join { session_id } if session_id == "s1"));

        let event: ClientEvent =
            serde_json::from_str(r#"{"type": "message", "session_id": "s1", "text": "hi"}"#)
                .unwrap();
        assert!(matches!(event, ClientEvent::Message { text, .. } if text == "hi"));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type": "shutdown"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_public_error_text_masks_internals() {
        let e = CareError::Store("connection pool exhausted".to_string());
        assert_eq!(public_error_text(&e), "internal error");
        let e = CareError::InvalidInput("empty message".to_string());
        assert_eq!(public_error_text(&e), "empty message");
    }
}
