//! Specialist agents
//!
//! Each intent is served by an agent that knows how to prompt the reasoning
//! backend for that category of question. Agents declare whether they run in
//! batch mode (one completion, one reply) or streaming mode (chunks pushed
//! as they arrive); the orchestrator drives them accordingly.
//!
//! The [`AgentRegistry`] binds every intent to an agent at startup and
//! refuses to start with an unbound intent.

mod department;
mod factual;
mod greeting;
mod guard;
mod hospital;
mod medicine;
mod registry;
mod research;

pub use guard::{HealthTopicGuard, OFF_TOPIC_REFUSAL};
pub use registry::AgentRegistry;

use async_trait::async_trait;

use crate::error::Result;
use crate::reasoning::{ChatTurn, StreamEvent};
use crate::sessions::{ChatMessage, Sender};

/// How an agent produces its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One completion, delivered whole
    Batch,
    /// Chunks pushed to the client as they arrive
    Streaming,
}

/// What an agent sees of the conversation.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub session_id: String,
    pub user_id: String,
    /// Recent history, oldest first, already windowed
    pub history: Vec<ChatTurn>,
    /// True when the assistant has not replied in this session yet
    pub is_first_exchange: bool,
}

impl ConversationContext {
    /// Build a context from stored messages, mapping senders onto chat roles.
    pub fn from_messages(
        session_id: &str,
        user_id: &str,
        messages: &[ChatMessage],
    ) -> Self {
        let history = messages
            .iter()
            .map(|m| match m.sender {
                Sender::User => ChatTurn::user(&m.text),
                Sender::Bot => ChatTurn::assistant(&m.text),
            })
            .collect();
        let is_first_exchange = !messages.iter().any(|m| m.sender == Sender::Bot && !m.is_error);
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            history,
            is_first_exchange,
        }
    }
}

/// A finished batch reply.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    /// Model that actually produced the reply
    pub model_used: String,
}

/// Trait implemented by every specialist agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logs and registry diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the orchestrator should stream this agent's replies.
    fn mode(&self) -> ExecutionMode;

    /// Model this agent prompts.
    fn model(&self) -> &str;

    /// Produce a complete reply.
    async fn run(&self, query: &str, ctx: &ConversationContext) -> Result<AgentReply>;

    /// Produce a streaming reply.
    ///
    /// The default falls back to [`Agent::run`] and emits a single terminal
    /// event; streaming agents override this.
    async fn run_stream(
        &self,
        query: &str,
        ctx: &ConversationContext,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>> {
        let reply = self.run(query, ctx).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(StreamEvent::Done {
                content: reply.text,
                usage: None,
            })
            .await;
        Ok(rx)
    }
}
