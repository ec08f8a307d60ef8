//! Deep research agent
//!
//! Expert-level research summaries on the most capable model. Extracts the
//! topic first so the research prompt stays focused.

use async_trait::async_trait;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::reasoning::{ChatTurn, CompletionRequest, ReasoningBackend};

use super::{Agent, AgentReply, ConversationContext, ExecutionMode};

const EXTRACT_PROMPT: &str = "Extract the precise medical research topic from the following query.\nIf the query mentions multiple topics, focus on the main one that requires in-depth research.\n\nUser query: \"{query}\"\n\nResponse format: Only output the extracted research topic - nothing else.";

pub struct ResearchAgent {
    backend: Arc<dyn ReasoningBackend>,
    model: String,
}

impl ResearchAgent {
    pub fn new(backend: Arc<dyn ReasoningBackend>, model: &str) -> Self {
        Self {
            backend,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Agent for ResearchAgent {
    fn name(&self) -> &'static str {
        "research"
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
        debug!(topic = %topic, "deep research topic");

        let prompt = format!(
            "Generate a comprehensive, expert-level research analysis on {}.\n\n\
             Your research should include:\n\
             1. Current scientific understanding and consensus on the topic\n\
             2. Recent advancements or breakthroughs (within the last 1-3 years)\n\
             3. Evidence-based treatments or interventions\n\
             4. Ongoing clinical trials or promising areas of research\n\
             5. Expert perspectives and any controversies in the field\n\
             6. Statistical data and epidemiological information, if relevant\n\
             7. References to specific research papers or medical guidelines\n\n\
             Structure this as an accessible yet thorough summary that balances scientific \
             accuracy with understandable language. Remember this is for informational \
             purposes only and not medical advice; note that research is continually \
             evolving and the user should consult healthcare professionals for \
             personalized guidance.",
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
