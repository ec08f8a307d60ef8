//! REST session management
//!
//! Small surface for clients to create, list, and delete sessions and to
//! fetch history outside the socket. All routes require a bearer token
//! resolved through [`Identity`](crate::auth::Identity).

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};

use super::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<String, Response> {
    let token = bearer_token(headers).unwrap_or("");
    state.identity.verify(token).await.map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid token" })),
        )
            .into_response()
    })
}

fn storage_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "storage unavailable" })),
    )
        .into_response()
}

/// POST /sessions — create a session for the authenticated user.
pub async fn create_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match require_user(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    match state.store.create_session(&user_id).await {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(_) => storage_error(),
    }
}

/// GET /sessions — the authenticated user's sessions, most recent first.
pub async fn list_sessions(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match require_user(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    match state.store.list_sessions(&user_id).await {
        Ok(sessions) => Json(sessions).into_response(),
        Err(_) => storage_error(),
    }
}

/// GET /sessions/{id}/messages — full ordered history of an owned session.
pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = match require_user(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    match state.store.get_session(&session_id).await {
        Ok(Some(session)) if session.user_id == user_id => {}
        Ok(Some(_)) => {
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "not your session" })),
            )
                .into_response();
        }
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "session not found" })),
            )
                .into_response();
        }
        Err(_) => return storage_error(),
    }
    match state.store.list_messages(&session_id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(_) => storage_error(),
    }
}

/// DELETE /sessions/{id} — remove an owned session and its messages.
pub async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = match require_user(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    match state.store.get_session(&session_id).await {
        Ok(Some(session)) if session.user_id == user_id => {}
        Ok(Some(_)) => {
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "not your session" })),
            )
                .into_response();
        }
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "session not found" })),
            )
                .into_response();
        }
        Err(_) => return storage_error(),
    }
    match state.store.delete_session(&session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => storage_error(),
    }
}
