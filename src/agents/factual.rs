//! Factual agent
//!
//! Balanced, evidence-only overviews of contested medical topics on the
//! research model. Never takes a stance; presents the evidence from all
//! sides and flags where consensus ends and debate begins.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::reasoning::{ChatTurn, CompletionRequest, ReasoningBackend};

use super::{Agent, AgentReply, ConversationContext, ExecutionMode};

const EXTRACT_PROMPT: &str = "Extract the primary medical topic from the following query, particularly noting if it's a topic that might be controversial or have differing medical perspectives.\n\nUser query: \"{query}\"\n\nResponse format: Only output the extracted medical topic - nothing else.";

pub struct FactualAgent {
    backend: Arc<dyn ReasoningBackend>,
    model: String,
}

impl FactualAgent {
    pub fn new(backend: Arc<dyn ReasoningBackend>, model: &str) -> Self {
        Self {
            backend,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Agent for FactualAgent {
    fn name(&self) -> &'static str {
        "factual"
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
        let topic = self.backend.complete(request).await?.content.trim().to_string();

        let prompt = format!(
            "Provide a balanced, evidence-based overview of {}.\n\n\
             Your analysis should:\n\
             1. Present factual information about the topic from a neutral perspective\n\
             2. Include multiple perspectives from mainstream medical science\n\
             3. Clearly distinguish between scientific consensus and areas of ongoing debate\n\
             4. Present relevant historical context and efficacy data where available\n\
             5. Acknowledge limitations in current research\n\
             6. Avoid taking a stance on controversial aspects, instead presenting the \
             evidence from all sides\n\
             7. Include relevant statistics and cite known outcomes where appropriate\n\n\
             Present the information in a straightforward, neutral tone. Avoid euphemisms \
             or overly cautious language that obscures facts, while maintaining appropriate \
             medical context. Conclude with a balanced summary of the current state of \
             evidence.",
            topic
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
