//! Error types for SonarCare
//!
//! This module defines all error types used throughout the SonarCare core.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Reasoning Backend Error Classification
// ============================================================================

/// Structured reasoning-backend error classification.
///
/// Provides fine-grained categorization of backend HTTP errors, enabling
/// retry decisions and accurate logging without string matching. The
/// orchestrator never forwards these to clients; every variant collapses
/// into one generic user-visible error bubble.
#[derive(Debug)]
pub enum BackendError {
    /// 401 — Invalid API key or authentication failure
    Auth(String),
    /// 429 — Rate limit or quota exceeded
    RateLimit(String),
    /// 402 — Payment required or billing issue
    Billing(String),
    /// 500/502/503/504 — Server-side errors
    ServerError(String),
    /// 400 — Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404 — Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Streaming call produced no chunk within the inactivity window
    Stalled(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            BackendError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            BackendError::Billing(msg) => write!(f, "Billing error: {}", msg),
            BackendError::ServerError(msg) => write!(f, "Server error: {}", msg),
            BackendError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            BackendError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            BackendError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            BackendError::Stalled(msg) => write!(f, "Stream stalled: {}", msg),
            BackendError::Unknown(msg) => write!(f, "Unknown backend error: {}", msg),
        }
    }
}

impl BackendError {
    /// Returns `true` if this error is transient and a fresh request from the
    /// user could succeed. The orchestrator never retries automatically; this
    /// only informs the log line.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::RateLimit(_)
                | BackendError::ServerError(_)
                | BackendError::Timeout(_)
                | BackendError::Stalled(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BackendError::Auth(_) => Some(401),
            BackendError::RateLimit(_) => Some(429),
            BackendError::Billing(_) => Some(402),
            BackendError::ServerError(_) => Some(500),
            BackendError::InvalidRequest(_) => Some(400),
            BackendError::ModelNotFound(_) => Some(404),
            BackendError::Timeout(_) => None,
            BackendError::Stalled(_) => None,
            BackendError::Unknown(_) => None,
        }
    }
}

impl From<BackendError> for CareError {
    fn from(err: BackendError) -> Self {
        CareError::Backend(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for SonarCare operations.
#[derive(Error, Debug)]
pub enum CareError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structured reasoning-backend error with classification.
    #[error("Backend error: {0}")]
    Backend(BackendError),

    /// Input errors (empty message, malformed event payload, etc.).
    /// Surfaced as a scoped error event, never as a bot message.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Session management errors (unknown session, ownership mismatch, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// Storage collaborator errors
    #[error("Store error: {0}")]
    Store(String),

    /// Delivery errors (event channel closed, connection gone, etc.)
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found (sessions, messages, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication or authorization failures
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// A specialized `Result` type for SonarCare operations.
pub type Result<T> = std::result::Result<T, CareError>;
