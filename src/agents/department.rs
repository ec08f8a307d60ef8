//! Department agent
//!
//! Helps users figure out which medical department or specialist to consult.
//! Extracts the condition first, then asks for specialty guidance.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::reasoning::{ChatTurn, CompletionRequest, ReasoningBackend};

use super::{Agent, AgentReply, ConversationContext, ExecutionMode};

const EXTRACT_PROMPT: &str = "Extract the primary medical condition, symptom, or health concern from the following query.\nIf multiple symptoms or conditions are mentioned, focus on the main one.\nIf no specific condition is mentioned, extract the general health topic.\n\nUser query: \"{query}\"\n\nResponse format: Only output the extracted condition or symptom - nothing else.";

pub struct DepartmentAgent {
    backend: Arc<dyn ReasoningBackend>,
    model: String,
}

impl DepartmentAgent {
    pub fn new(backend: Arc<dyn ReasoningBackend>, model: &str) -> Self {
        Self {
            backend,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Agent for DepartmentAgent {
    fn name(&self) -> &'static str {
        "department"
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Batch
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn run(&self, query: &str, _ctx: &ConversationContext) -> Result<AgentReply> {
        let extract = EXTRACT_PROMPT.replace("{query}", query);
        let request =
            CompletionRequest::new(vec![ChatTurn::user(&extract)]).with_model(&self.model);
        let condition = self.backend.complete(request).await?.content.trim().to_string();

        let prompt = format!(
            "Explain which medical specialty or department typically treats {}. Cover: \
             the primary specialty and relevant sub-specialties, whether to start with a \
             primary care physician or go straight to a specialist, how referrals usually \
             work, what the specialist will likely examine or test, and how to prepare \
             for the appointment. Keep the guidance practical and note that a primary \
             care physician can confirm the right pathway for the individual case.",
            condition
        );
        let request =
            CompletionRequest::new(vec![ChatTurn::user(&prompt)]).with_model(&self.model);
        let completion = self.backend.complete(request).await?;
        Ok(AgentReply {
            text: completion.content,
            model_used: self.model.clone(),
        })
    }
}
