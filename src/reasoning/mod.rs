//! Reasoning backends
//!
//! This module defines the [`ReasoningBackend`] trait and common types for
//! talking to a hosted reasoning model. The production backend is
//! [`SonarBackend`], which speaks the Perplexity Sonar chat-completions API;
//! tests substitute scripted fakes behind the same trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use sonarcare::reasoning::{ChatTurn, CompletionRequest, ReasoningBackend};
//! use sonarcare::reasoning::sonar::SonarBackend;
//!
//! async fn example(backend: SonarBackend) {
//!     let request = CompletionRequest::new(vec![
//!         ChatTurn::system("You are a careful medical assistant."),
//!         ChatTurn::user("What causes tension headaches?"),
//!     ]);
//!     let completion = backend.complete(request).await.unwrap();
//!     println!("{}", completion.content);
//! }
//! ```

pub mod sonar;

pub use sonar::SonarBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, Result};

/// Role of a single turn sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// A completion request, built up with the builder pattern.
///
/// The model is optional; backends substitute their default when absent.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Conversation turns, system prompt first
    pub messages: Vec<ChatTurn>,
    /// Model override (backend default when None)
    pub model: Option<String>,
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0 = deterministic)
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a request over the given turns.
    ///
    /// # Example
    /// ```
    /// use sonarcare::reasoning::{ChatTurn, CompletionRequest};
    ///
    /// let request = CompletionRequest::new(vec![ChatTurn::user("hello")]);
    /// assert!(request.model.is_none());
    /// ```
    pub fn new(messages: Vec<ChatTurn>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Override the backend's default model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// Cap the number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,
    /// Number of tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Full response from a non-streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Text content of the response
    pub content: String,
    /// Token usage information (if available)
    pub usage: Option<Usage>,
}

impl Completion {
    /// Create a plain text completion with no usage information.
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            usage: None,
        }
    }
}

/// One event on a streaming completion channel.
///
/// A well-behaved stream is zero or more `Delta` events followed by exactly
/// one terminal event, either `Done` or `Error`.
#[derive(Debug)]
pub enum StreamEvent {
    /// Incremental text fragment
    Delta(String),
    /// Stream finished; carries the fully assembled text
    Done {
        content: String,
        usage: Option<Usage>,
    },
    /// Stream failed partway through
    Error(crate::error::CareError),
}

/// Trait for reasoning backends.
///
/// Implement this trait to plug in a different hosted model. The backend is
/// responsible for translating between the crate's turn format and the
/// provider's wire format.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Run a completion to completion and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Start a streaming completion.
    ///
    /// Returns a bounded channel of [`StreamEvent`]s. The channel closes
    /// after the terminal event.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>>;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Backend name for logs and metadata.
    fn name(&self) -> &str;
}

/// Parse an HTTP status code and response body into a structured [`BackendError`].
///
/// Centralizes the mapping from status codes to error classifications so the
/// backend produces consistent typed errors from every call site.
pub fn parse_backend_error(status: u16, body: &str) -> BackendError {
    match status {
        401 => BackendError::Auth(body.to_string()),
        402 => BackendError::Billing(body.to_string()),
        404 => BackendError::ModelNotFound(body.to_string()),
        429 => BackendError::RateLimit(body.to_string()),
        400 => BackendError::InvalidRequest(body.to_string()),
        500..=599 => BackendError::ServerError(body.to_string()),
        _ => BackendError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
