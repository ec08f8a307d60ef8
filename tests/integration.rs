//! Integration tests for SonarCare
//!
//! These tests verify that the components work together: the HTTP surface
//! over the real router, classification feeding the topic guard, the store's
//! ordering guarantees as seen by conversation assembly, and the wire
//! format clients depend on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use sonarcare::agents::{AgentRegistry, ConversationContext, HealthTopicGuard};
use sonarcare::auth::DevIdentity;
use sonarcare::config::Config;
use sonarcare::delivery::DeliveryChannel;
use sonarcare::error::Result;
use sonarcare::intent::{Intent, IntentClassifier};
use sonarcare::orchestrator::Orchestrator;
use sonarcare::reasoning::{Completion, CompletionRequest, ReasoningBackend, Role, StreamEvent};
use sonarcare::server::{build_router, AppState};
use sonarcare::sessions::{ChatMessage, ConnectionRegistry, Session};
use sonarcare::store::{MemoryStore, SessionStore, SessionUpdate};

// ============================================================================
// Shared fixtures
// ============================================================================

struct StubBackend;

#[async_trait]
impl ReasoningBackend for StubBackend {
    async fn complete(&self, _request: CompletionRequest) -> Result<Completion> {
        Ok(Completion::text("ok"))
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(StreamEvent::Done {
                content: "ok".to_string(),
                usage: None,
            })
            .await;
        Ok(rx)
    }

    fn default_model(&self) -> &str {
        "stub"
    }

    fn name(&self) -> &str {
        "stub"
    }
}

fn app() -> (axum::Router, Arc<MemoryStore>) {
    let config = Config::default();
    let store = Arc::new(MemoryStore::new());
    let connections = Arc::new(ConnectionRegistry::new());
    let delivery = Arc::new(DeliveryChannel::new(
        connections.clone(),
        Duration::from_secs(config.limits.dedup_ttl_secs),
        config.limits.dedup_capacity,
    ));
    let registry = AgentRegistry::build(&config.backend, Arc::new(StubBackend)).unwrap();
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone() as Arc<dyn SessionStore>,
        registry,
        delivery.clone(),
        config.limits.clone(),
    ));
    let state = AppState {
        store: store.clone(),
        connections,
        delivery,
        orchestrator,
        identity: Arc::new(DevIdentity::new()),
        started_at: Instant::now(),
    };
    (build_router(state, &config), store)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// REST surface over the real router
// ============================================================================

#[tokio::test]
async fn test_session_lifecycle_over_http() {
    let (router, _store) = app();

    // Create
    let response = router
        .clone()
        .oneshot(
            Request::post("/sessions")
                .header("authorization", "Bearer alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = body_json(response).await;
    let session_id = session["id"].as_str().unwrap().to_string();
    assert_eq!(session["user_id"], "alice");
    assert!(session["title"].is_null());

    // List shows it
    let response = router
        .clone()
        .oneshot(
            Request::get("/sessions")
                .header("authorization", "Bearer alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sessions = body_json(response).await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);

    // Empty history
    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/sessions/{session_id}/messages"))
                .header("authorization", "Bearer alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.as_array().unwrap().is_empty());

    // Delete, then the list is empty again
    let response = router
        .clone()
        .oneshot(
            Request::delete(format!("/sessions/{session_id}"))
                .header("authorization", "Bearer alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router
        .oneshot(
            Request::get("/sessions")
                .header("authorization", "Bearer alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let sessions = body_json(response).await;
    assert!(sessions.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_users_only_see_their_own_sessions() {
    let (router, store) = app();
    store.create_session("alice").await.unwrap();
    store.create_session("bob").await.unwrap();

    let response = router
        .oneshot(
            Request::get("/sessions")
                .header("authorization", "Bearer alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let sessions = body_json(response).await;
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["user_id"], "alice");
}

#[tokio::test]
async fn test_foreign_history_is_forbidden() {
    let (router, store) = app();
    let session = store.create_session("alice").await.unwrap();

    let response = router
        .oneshot(
            Request::get(format!("/sessions/{}/messages", session.id))
                .header("authorization", "Bearer mallory")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_session_history_is_404() {
    let (router, _store) = app();
    let response = router
        .oneshot(
            Request::get("/sessions/no-such-session/messages")
                .header("authorization", "Bearer alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Classification and the topic guard agree on medical questions
// ============================================================================

#[tokio::test]
async fn test_medical_intents_pass_the_guard() {
    let classifier = IntentClassifier::new();
    let guard = HealthTopicGuard::new();

    let questions = [
        ("I have a terrible headache and nausea", Intent::SymptomInquiry),
        ("what is the treatment for strep throat", Intent::TreatmentInquiry),
        ("find a hospital near me", Intent::HospitalSearch),
        (
            "which specialist handles a recurring skin condition",
            Intent::DepartmentInquiry,
        ),
    ];
    for (text, expected) in questions {
        assert_eq!(classifier.classify(text), expected, "{text}");
        assert!(guard.is_health_related(text), "{text}");
    }
}

#[tokio::test]
async fn test_off_topic_text_fails_the_guard() {
    let classifier = IntentClassifier::new();
    let guard = HealthTopicGuard::new();

    for text in [
        "what's a good pasta recipe",
        "recommend a science fiction novel",
        "how do I file my taxes",
    ] {
        assert_eq!(classifier.classify(text), Intent::Fallback, "{text}");
        assert!(!guard.is_health_related(text), "{text}");
    }
}

// ============================================================================
// Store ordering feeds conversation assembly
// ============================================================================

#[tokio::test]
async fn test_history_window_keeps_order_and_roles() {
    let store = MemoryStore::new();
    let session = store.create_session("u1").await.unwrap();

    for i in 0..6 {
        store
            .append_message(ChatMessage::user(&session.id, "u1", &format!("question {i}")))
            .await
            .unwrap();
        store
            .append_message(ChatMessage::bot(&session.id, "u1", &format!("answer {i}")))
            .await
            .unwrap();
    }

    let recent = store.recent_messages(&session.id, 4).await.unwrap();
    assert_eq!(recent.len(), 4);
    let ctx = ConversationContext::from_messages(&session.id, "u1", &recent);
    assert_eq!(ctx.history.len(), 4);
    assert_eq!(ctx.history[0].role, Role::User);
    assert_eq!(ctx.history[0].content, "question 4");
    assert_eq!(ctx.history[3].role, Role::Assistant);
    assert_eq!(ctx.history[3].content, "answer 5");
    assert!(!ctx.is_first_exchange);
}

#[tokio::test]
async fn test_seq_assignment_is_per_session() {
    let store = MemoryStore::new();
    let first = store.create_session("u1").await.unwrap();
    let second = store.create_session("u1").await.unwrap();

    let a = store
        .append_message(ChatMessage::user(&first.id, "u1", "one"))
        .await
        .unwrap();
    let b = store
        .append_message(ChatMessage::user(&second.id, "u1", "one"))
        .await
        .unwrap();
    let c = store
        .append_message(ChatMessage::user(&first.id, "u1", "two"))
        .await
        .unwrap();

    assert_eq!(a.seq, Some(0));
    assert_eq!(b.seq, Some(0));
    assert_eq!(c.seq, Some(1));
}

#[tokio::test]
async fn test_list_sessions_orders_by_activity() {
    let store = MemoryStore::new();
    let older = store.create_session("u1").await.unwrap();
    let newer = store.create_session("u1").await.unwrap();

    // Touch the older session so it becomes the most recent.
    let update = SessionUpdate::touched()
        .with_last_activity(chrono::Utc::now() + chrono::Duration::seconds(5));
    store.update_session(&older.id, update).await.unwrap();

    let sessions = store.list_sessions("u1").await.unwrap();
    assert_eq!(sessions[0].id, older.id);
    assert_eq!(sessions[1].id, newer.id);
}

// ============================================================================
// Wire format clients depend on
// ============================================================================

#[tokio::test]
async fn test_message_wire_shape() {
    let store = MemoryStore::new();
    let session = store.create_session("u1").await.unwrap();
    let stored = store
        .append_message(ChatMessage::user(&session.id, "u1", "hello"))
        .await
        .unwrap();

    let json = serde_json::to_value(&stored).unwrap();
    assert_eq!(json["sender"], "user");
    assert_eq!(json["seq"], 0);
    assert_eq!(json["is_streaming"], false);
    assert_eq!(json["is_error"], false);
    // Metadata is omitted entirely when absent.
    assert!(json.get("metadata").is_none() || json["metadata"].is_null());
}

#[test]
fn test_session_wire_shape() {
    let session = Session::new("u1");
    let json = serde_json::to_value(&session).unwrap();
    assert_eq!(json["user_id"], "u1");
    assert!(json["title"].is_null());
    assert!(json["created_at"].is_string());
}

#[test]
fn test_intent_wire_names() {
    assert_eq!(
        serde_json::to_value(Intent::SymptomInquiry).unwrap(),
        "symptom_inquiry"
    );
    assert_eq!(
        serde_json::to_value(Intent::HospitalSearch).unwrap(),
        "hospital_search"
    );
}
