//! Greeting agent
//!
//! Handles greetings and small talk on the lightweight model. First contact
//! in a session gets a fuller introduction than a returning greeting.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::reasoning::{ChatTurn, CompletionRequest, ReasoningBackend};

use super::{Agent, AgentReply, ConversationContext, ExecutionMode};

const FIRST_TIME_PROMPT: &str = "Generate a comprehensive introduction for a medical advice chatbot named SonarCare.\nThe introduction should:\n- Warmly welcome the user\n- Explain that SonarCare provides general health information, not medical diagnosis\n- Emphasize the importance of consulting healthcare professionals for medical advice\n- Mention it can help with general symptom information, treatment options, and finding appropriate medical departments\n- Invite the user to ask health-related questions\n- Be friendly and reassuring\n\nResponse format: Just the introduction text, no additional explanations.";

const RETURNING_PROMPT: &str = "Generate a friendly, empathetic greeting for a medical advice chatbot.\nThe greeting should:\n- Be warm and welcoming\n- Briefly introduce the chatbot as SonarCare, a medical assistant\n- Mention that it provides general health information, not medical diagnosis\n- Encourage the user to ask health-related questions\n- Be concise (2-3 sentences maximum)\n\nResponse format: Just the greeting text, no additional explanations.";

pub struct GreetingAgent {
    backend: Arc<dyn ReasoningBackend>,
    model: String,
}

impl GreetingAgent {
    pub fn new(backend: Arc<dyn ReasoningBackend>, model: &str) -> Self {
        Self {
            backend,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Agent for GreetingAgent {
    fn name(&self) -> &'static str {
        "greeting"
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Batch
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn run(&self, _query: &str, ctx: &ConversationContext) -> Result<AgentReply> {
        let prompt = if ctx.is_first_exchange {
            FIRST_TIME_PROMPT
        } else {
            RETURNING_PROMPT
        };
        let request = CompletionRequest::new(vec![ChatTurn::user(prompt)])
            .with_model(&self.model);
        let completion = self.backend.complete(request).await?;
        Ok(AgentReply {
            text: completion.content,
            model_used: self.model.clone(),
        })
    }
}
