//! Message orchestration
//!
//! Drives one user message from acceptance to a finalized reply: validate,
//! absorb duplicates, persist and echo the user message, classify, route,
//! run the agent under its timeout discipline, and finalize exactly one
//! outcome message even when the run fails partway through a stream.
//!
//! Acceptance is serialized per session so stored order within a session
//! matches arrival order; different sessions never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::agents::{
    AgentRegistry, ConversationContext, ExecutionMode, HealthTopicGuard, OFF_TOPIC_REFUSAL,
};
use crate::config::LimitsConfig;
use crate::delivery::DeliveryChannel;
use crate::error::{CareError, Result};
use crate::intent::{Intent, IntentClassifier};
use crate::reasoning::StreamEvent;
use crate::sessions::{derive_title, ChatMessage, MessageMetadata, Sender};
use crate::store::{SessionStore, SessionUpdate};

/// Reply used when an agent run fails. The real cause is logged, never sent.
const FAILURE_REPLY: &str =
    "I'm sorry, something went wrong while preparing your answer. Please try again.";

/// Progress line shown while an agent works.
const WORKING_STATUS: &str = "Generating response...";

pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    registry: AgentRegistry,
    delivery: Arc<DeliveryChannel>,
    classifier: IntentClassifier,
    guard: HealthTopicGuard,
    limits: LimitsConfig,
    /// Per-session acceptance locks
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: AgentRegistry,
        delivery: Arc<DeliveryChannel>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            store,
            registry,
            delivery,
            classifier: IntentClassifier::new(),
            guard: HealthTopicGuard::new(),
            limits,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        // A lock held only by the map has no waiter; dropping it keeps the
        // map bounded by the number of sessions with in-flight messages.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Handle one inbound user message end to end.
    ///
    /// Returns `Err` only for input errors the caller should report back on
    /// the submitting connection (empty text, unknown session, wrong owner).
    /// Agent failures are handled in-band as error replies and return `Ok`.
    pub async fn handle_message(
        &self,
        session_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CareError::InvalidInput("empty message".to_string()));
        }

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| CareError::NotFound(format!("session {}", session_id)))?;
        if session.user_id != user_id {
            return Err(CareError::Unauthorized(
                "session belongs to another user".to_string(),
            ));
        }

        // Acceptance: duplicate absorption plus persist-and-echo, under the
        // session lock so arrival order equals stored order.
        let accepted = {
            let lock = self.session_lock(session_id).await;
            let _guard = lock.lock().await;

            if !self.delivery.should_process(user_id, session_id, text) {
                info!(session = session_id, "duplicate message absorbed");
                return Ok(());
            }

            let stored = self
                .store
                .append_message(ChatMessage::user(session_id, user_id, text))
                .await?;
            self.delivery.send_message(&stored).await;
            stored
        };

        let intent = self.classifier.classify(text);
        info!(session = session_id, intent = %intent, "message classified");

        // Off-topic input gets a canned refusal without a backend call.
        // Greetings pass; the guard vocabulary does not cover small talk.
        if intent != Intent::Greeting && !self.guard.is_health_related(text) {
            let metadata = self.reply_metadata(session_id, intent, None).await?;
            let reply = ChatMessage::bot(session_id, user_id, OFF_TOPIC_REFUSAL)
                .with_metadata(metadata);
            let stored = self.store.append_message(reply).await?;
            self.delivery.send_message(&stored).await;
            self.finish_session_bookkeeping(session_id, &stored).await;
            return Ok(());
        }

        let agent = self.registry.route(intent);
        self.delivery.typing(session_id, true).await;
        self.delivery.status(session_id, WORKING_STATUS).await;

        let history = self
            .store
            .recent_messages(session_id, self.limits.history_window)
            .await?;
        let ctx = ConversationContext::from_messages(session_id, user_id, &history);

        let outcome = match agent.mode() {
            ExecutionMode::Batch => {
                self.run_batch(agent.as_ref(), &accepted, &ctx, intent).await
            }
            ExecutionMode::Streaming => {
                self.run_streaming(agent.as_ref(), &accepted, &ctx, intent)
                    .await
            }
        };

        self.delivery.typing(session_id, false).await;

        match outcome {
            Ok(stored) => {
                self.finish_session_bookkeeping(session_id, &stored).await;
                Ok(())
            }
            Err(e) => {
                // Unreachable in practice: both run paths finalize their own
                // error reply and only fail here when the store is down.
                error!(session = session_id, error = %e, "reply could not be finalized");
                Err(e)
            }
        }
    }

    /// Metadata for a reply: which model answered, under which intent, and
    /// whether the client should show the disclaimer. The disclaimer shows
    /// on the first reply in a session and on every medical-advice reply.
    async fn reply_metadata(
        &self,
        session_id: &str,
        intent: Intent,
        model_used: Option<&str>,
    ) -> Result<MessageMetadata> {
        let history = self.store.list_messages(session_id).await?;
        let first_reply = !history
            .iter()
            .any(|m| m.sender == Sender::Bot && !m.is_error);
        Ok(MessageMetadata {
            model_used: model_used.map(|m| m.to_string()),
            intent: Some(intent),
            show_disclaimer: first_reply || intent.is_medical_advice(),
        })
    }

    async fn run_batch(
        &self,
        agent: &dyn crate::agents::Agent,
        accepted: &ChatMessage,
        ctx: &ConversationContext,
        intent: Intent,
    ) -> Result<ChatMessage> {
        let reply_timeout = Duration::from_secs(self.limits.reply_timeout_secs);
        let result = timeout(reply_timeout, agent.run(&accepted.text, ctx)).await;

        match result {
            Ok(Ok(reply)) => {
                let metadata = self
                    .reply_metadata(&accepted.session_id, intent, Some(&reply.model_used))
                    .await?;
                let message =
                    ChatMessage::bot(&accepted.session_id, &accepted.user_id, &reply.text)
                        .with_metadata(metadata);
                let stored = self.store.append_message(message).await?;
                self.delivery.send_message(&stored).await;
                Ok(stored)
            }
            Ok(Err(e)) => {
                warn!(agent = agent.name(), error = %e, "agent run failed");
                self.finalize_batch_failure(accepted, intent).await
            }
            Err(_) => {
                warn!(
                    agent = agent.name(),
                    timeout_secs = self.limits.reply_timeout_secs,
                    "agent run timed out"
                );
                self.finalize_batch_failure(accepted, intent).await
            }
        }
    }

    async fn finalize_batch_failure(
        &self,
        accepted: &ChatMessage,
        intent: Intent,
    ) -> Result<ChatMessage> {
        let metadata = self
            .reply_metadata(&accepted.session_id, intent, None)
            .await?;
        let message = ChatMessage::error(&accepted.session_id, &accepted.user_id, FAILURE_REPLY)
            .with_metadata(metadata);
        let stored = self.store.append_message(message).await?;
        self.delivery.send_message(&stored).await;
        Ok(stored)
    }

    async fn run_streaming(
        &self,
        agent: &dyn crate::agents::Agent,
        accepted: &ChatMessage,
        ctx: &ConversationContext,
        intent: Intent,
    ) -> Result<ChatMessage> {
        let session_id = &accepted.session_id;
        let chunk_timeout = Duration::from_secs(self.limits.chunk_timeout_secs);
        let reply_timeout = Duration::from_secs(self.limits.reply_timeout_secs);

        // Setup (including any pre-stream extraction calls) runs under the
        // whole-reply bound; afterwards each chunk gets its own bound.
        let mut rx = match timeout(reply_timeout, agent.run_stream(&accepted.text, ctx)).await {
            Ok(Ok(rx)) => rx,
            Ok(Err(e)) => {
                warn!(agent = agent.name(), error = %e, "stream setup failed");
                return self.finalize_batch_failure(accepted, intent).await;
            }
            Err(_) => {
                warn!(agent = agent.name(), "stream setup timed out");
                return self.finalize_batch_failure(accepted, intent).await;
            }
        };

        // The reply's shell is created before the stream opens so every
        // chunk frame carries the id the reply will be persisted under.
        let shell = ChatMessage::streaming(session_id, &accepted.user_id);
        self.delivery.begin(&shell).await;
        let mut assembled = String::new();

        let final_text: std::result::Result<String, CareError> = loop {
            match timeout(chunk_timeout, rx.recv()).await {
                Ok(Some(StreamEvent::Delta(delta))) => {
                    assembled.push_str(&delta);
                    self.delivery.chunk(&shell.id, &delta).await?;
                }
                Ok(Some(StreamEvent::Done { content, .. })) => {
                    // The terminal event is authoritative over the deltas.
                    break Ok(if content.is_empty() { assembled } else { content });
                }
                Ok(Some(StreamEvent::Error(e))) => break Err(e),
                Ok(None) => {
                    // Channel closed without a terminal event; keep whatever
                    // arrived if anything did.
                    if assembled.is_empty() {
                        break Err(CareError::Backend(
                            crate::error::BackendError::Unknown(
                                "stream ended without completion".to_string(),
                            ),
                        ));
                    }
                    break Ok(assembled);
                }
                Err(_) => {
                    break Err(CareError::Backend(crate::error::BackendError::Stalled(
                        format!("no chunk within {}s", self.limits.chunk_timeout_secs),
                    )))
                }
            }
        };

        match final_text {
            Ok(text) => {
                let metadata = self
                    .reply_metadata(session_id, intent, Some(agent.model()))
                    .await?;
                let mut message = shell.clone();
                message.is_streaming = false;
                message.text = text;
                message.metadata = Some(metadata);
                let stored = self.store.append_message(message).await?;
                self.delivery.complete(&shell.id, &stored).await;
                Ok(stored)
            }
            Err(e) => {
                warn!(agent = agent.name(), error = %e, "stream failed");
                let metadata = self.reply_metadata(session_id, intent, None).await?;
                let mut message = shell.clone();
                message.is_streaming = false;
                message.is_error = true;
                message.text = FAILURE_REPLY.to_string();
                message.metadata = Some(metadata);
                let stored = self.store.append_message(message).await?;
                // Finalizing with the error reply guarantees no message is
                // left streaming on the client.
                self.delivery.complete(&shell.id, &stored).await;
                Ok(stored)
            }
        }
    }

    /// Post-reply bookkeeping: bump activity and derive the title once.
    async fn finish_session_bookkeeping(&self, session_id: &str, reply: &ChatMessage) {
        let mut update = SessionUpdate::touched();
        if !reply.is_error {
            if let Ok(Some(session)) = self.store.get_session(session_id).await {
                if session.title.is_none() {
                    update.title = Some(derive_title(&reply.text));
                }
            }
        }
        if let Err(e) = self.store.update_session(session_id, update).await {
            warn!(session = session_id, error = %e, "session bookkeeping failed");
        }
    }
}
