//! Hospital search agent
//!
//! Finds hospitals and medical facilities. A first extraction call parses
//! location and specialty out of the query, then a grounded search prompt
//! produces the facility guidance.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::reasoning::{ChatTurn, CompletionRequest, ReasoningBackend};

use super::{Agent, AgentReply, ConversationContext, ExecutionMode};

const EXTRACT_PROMPT: &str = "Extract the location and medical specialty from the following query.\n\nUser query: \"{query}\"\n\nUse the format:\nLocation: [extracted location, or \"unspecified\" if none]\nSpecialty: [extracted medical specialty or condition, or \"general\" if none]";

static LOCATION_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"Location:\s*(.+)").ok());
static SPECIALTY_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"Specialty:\s*(.+)").ok());

/// Location and specialty pulled from a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityQuery {
    pub location: String,
    pub specialty: String,
}

/// Parse the extraction response. Missing fields fall back to the same
/// defaults the prompt instructs the model to use.
fn parse_facility_query(response: &str) -> FacilityQuery {
    let capture = |re: &Option<Regex>| {
        re.as_ref()
            .and_then(|re| re.captures(response))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };
    FacilityQuery {
        location: capture(&LOCATION_RE).unwrap_or_else(|| "unspecified".to_string()),
        specialty: capture(&SPECIALTY_RE).unwrap_or_else(|| "general".to_string()),
    }
}

pub struct HospitalAgent {
    backend: Arc<dyn ReasoningBackend>,
    model: String,
}

impl HospitalAgent {
    pub fn new(backend: Arc<dyn ReasoningBackend>, model: &str) -> Self {
        Self {
            backend,
            model: model.to_string(),
        }
    }

    async fn extract(&self, query: &str) -> Result<FacilityQuery> {
        let prompt = EXTRACT_PROMPT.replace("{query}", query);
        let request =
            CompletionRequest::new(vec![ChatTurn::user(&prompt)]).with_model(&self.model);
        let completion = self.backend.complete(request).await?;
        Ok(parse_facility_query(&completion.content))
    }
}

#[async_trait]
impl Agent for HospitalAgent {
    fn name(&self) -> &'static str {
        "hospital"
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Batch
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn run(&self, query: &str, _ctx: &ConversationContext) -> Result<AgentReply> {
        let facility = self.extract(query).await?;
        debug!(location = %facility.location, specialty = %facility.specialty, "facility search");

        let specialty_clause = if facility.specialty == "general" {
            String::new()
        } else {
            format!(" specializing in {}", facility.specialty)
        };
        let prompt = format!(
            "Provide practical guidance on hospitals and medical facilities in {}{}. \
             Search for current information and cover: names and types of major facilities, \
             relevant departments and services, emergency and urgent care options, how to \
             choose between the facilities, and what to bring to an appointment. \
             Use numbered citations with actual URLs where you searched the internet, \
             and close with a \"Verified Sources and References\" section listing them. \
             If the location is unspecified, explain how to find well-rated facilities \
             nearby and what to look for.",
            facility.location, specialty_clause
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
