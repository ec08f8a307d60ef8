//! SonarCare - medical-advice chatbot backend with multi-agent streaming

pub mod agents;
pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod reasoning;
pub mod server;
pub mod sessions;
pub mod store;

pub use config::Config;
pub use delivery::{DeliveryChannel, ServerEvent};
pub use error::{CareError, Result};
pub use intent::{Intent, IntentClassifier};
pub use orchestrator::Orchestrator;
pub use reasoning::{ChatTurn, Completion, CompletionRequest, ReasoningBackend, Role, StreamEvent};
pub use sessions::{ChatMessage, ConnectionRegistry, MessageMetadata, Sender, Session};
pub use store::{MemoryStore, SessionStore, SessionUpdate};
