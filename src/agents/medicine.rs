//! Medicine agent
//!
//! Serves symptom, treatment, and general medical-advice questions. Works
//! in two steps: a small extraction call pins down the condition being
//! asked about, then the full advice prompt is streamed so the client sees
//! text as it is generated.

use async_trait::async_trait;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::reasoning::{ChatTurn, CompletionRequest, ReasoningBackend, StreamEvent};

use super::{Agent, AgentReply, ConversationContext, ExecutionMode};

const EXTRACT_PROMPT: &str = "Extract the primary medical condition, symptom, or health concern from the following query.\nIf multiple symptoms or conditions are mentioned, focus on the main one.\nIf no specific condition is mentioned, extract the general health topic.\n\nUser query: \"{query}\"\n\nResponse format: Only output the extracted condition or symptom - nothing else.";

const ADVICE_SYSTEM_PROMPT: &str = "You are SonarCare, a careful medical information assistant. Provide a detailed, evidence-based response covering: what the condition is and how it affects the body, causes and risk factors, the spectrum of symptoms and how they progress, management and treatment options including self-care, when to seek medical attention with clear warning signs, and prevention and long-term outlook. Maintain an empathetic, supportive tone. Emphasize that this is general health information to support informed decision-making, not personalized medical advice, and encourage professional consultation for diagnosis and treatment planning.";

pub struct MedicineAgent {
    backend: Arc<dyn ReasoningBackend>,
    model: String,
}

impl MedicineAgent {
    pub fn new(backend: Arc<dyn ReasoningBackend>, model: &str) -> Self {
        Self {
            backend,
            model: model.to_string(),
        }
    }

    /// Step one: pin down what the question is actually about.
    async fn extract_condition(&self, query: &str) -> Result<String> {
        let prompt = EXTRACT_PROMPT.replace("{query}", query);
        let request =
            CompletionRequest::new(vec![ChatTurn::user(&prompt)]).with_model(&self.model);
        let completion = self.backend.complete(request).await?;
        Ok(completion.content.trim().to_string())
    }

    /// Build the advice request from the extracted condition and history.
    fn advice_request(&self, query: &str, condition: &str, ctx: &ConversationContext) -> CompletionRequest {
        let mut messages = vec![ChatTurn::system(ADVICE_SYSTEM_PROMPT)];
        messages.extend(ctx.history.iter().cloned());
        messages.push(ChatTurn::user(&format!(
            "The question concerns: {}\n\nUser query: \"{}\"",
            condition, query
        )));
        CompletionRequest::new(messages).with_model(&self.model)
    }
}

#[async_trait]
impl Agent for MedicineAgent {
    fn name(&self) -> &'static str {
        "medicine"
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Streaming
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn run(&self, query: &str, ctx: &ConversationContext) -> Result<AgentReply> {
        let condition = self.extract_condition(query).await?;
        debug!(condition = %condition, "extracted condition");
        let completion = self
            .backend
            .complete(self.advice_request(query, &condition, ctx))
            .await?;
        Ok(AgentReply {
            text: completion.content,
            model_used: self.model.clone(),
        })
    }

    async fn run_stream(
        &self,
        query: &str,
        ctx: &ConversationContext,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>> {
        let condition = self.extract_condition(query).await?;
        debug!(condition = %condition, "extracted condition");
        self.backend
            .stream(self.advice_request(query, &condition, ctx))
            .await
    }
}
