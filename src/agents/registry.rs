//! Agent registry
//!
//! Binds every intent to a specialist agent at startup. Routing is total by
//! construction: `build` validates the table against the full intent
//! enumeration and fails fast if anything is unbound, so `route` can never
//! miss at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::BackendConfig;
use crate::error::{CareError, Result};
use crate::intent::Intent;
use crate::reasoning::ReasoningBackend;

use super::department::DepartmentAgent;
use super::factual::FactualAgent;
use super::greeting::GreetingAgent;
use super::hospital::HospitalAgent;
use super::medicine::MedicineAgent;
use super::research::ResearchAgent;
use super::Agent;

/// Intent-to-agent binding table.
pub struct AgentRegistry {
    agents: HashMap<Intent, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Build the full binding table over one reasoning backend.
    ///
    /// Fails when any intent is left unbound, so a misconfigured table is a
    /// startup error rather than a runtime surprise.
    pub fn build(config: &BackendConfig, backend: Arc<dyn ReasoningBackend>) -> Result<Self> {
        let greeting: Arc<dyn Agent> =
            Arc::new(GreetingAgent::new(backend.clone(), &config.light_model));
        let medicine: Arc<dyn Agent> =
            Arc::new(MedicineAgent::new(backend.clone(), &config.model));
        let hospital: Arc<dyn Agent> =
            Arc::new(HospitalAgent::new(backend.clone(), &config.model));
        let department: Arc<dyn Agent> =
            Arc::new(DepartmentAgent::new(backend.clone(), &config.model));
        let research: Arc<dyn Agent> =
            Arc::new(ResearchAgent::new(backend.clone(), &config.research_model));
        let factual: Arc<dyn Agent> =
            Arc::new(FactualAgent::new(backend, &config.research_model));

        let mut agents: HashMap<Intent, Arc<dyn Agent>> = HashMap::new();
        agents.insert(Intent::Greeting, greeting);
        agents.insert(Intent::SymptomInquiry, medicine.clone());
        agents.insert(Intent::TreatmentInquiry, medicine.clone());
        agents.insert(Intent::ComprehensiveAssessment, medicine.clone());
        agents.insert(Intent::Fallback, medicine);
        agents.insert(Intent::HospitalSearch, hospital);
        agents.insert(Intent::DepartmentInquiry, department);
        agents.insert(Intent::DeepResearch, research);
        agents.insert(Intent::FactCheck, factual);

        let registry = Self { agents };
        registry.validate()?;
        info!(agents = registry.agents.len(), "agent registry ready");
        Ok(registry)
    }

    /// Verify every intent has an agent bound.
    fn validate(&self) -> Result<()> {
        for intent in Intent::ALL {
            if !self.agents.contains_key(&intent) {
                return Err(CareError::Config(format!(
                    "no agent bound for intent {}",
                    intent
                )));
            }
        }
        Ok(())
    }

    /// Number of bound intents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// True when no intents are bound. `build` never produces this.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agent serving an intent. Total; `build` guarantees the binding.
    pub fn route(&self, intent: Intent) -> Arc<dyn Agent> {
        self.agents
            .get(&intent)
            .cloned()
            .unwrap_or_else(|| self.agents[&Intent::Fallback].clone())
    }
}
