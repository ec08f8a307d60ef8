//! Connection identity
//!
//! Maps a connect-time token onto a user id. The production deployment sits
//! behind an identity provider; [`DevIdentity`] trusts the token as the user
//! id directly and is what local development and tests run with.

use async_trait::async_trait;

use crate::error::{CareError, Result};

/// Verifies connect-time credentials.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Resolve a token to a user id, or fail with
    /// [`CareError::Unauthorized`].
    async fn verify(&self, token: &str) -> Result<String>;
}

/// Development identity: the token is the user id.
///
/// Rejects only empty tokens so every connection still carries a stable
/// user identity for session ownership checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevIdentity;

impl DevIdentity {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Identity for DevIdentity {
    async fn verify(&self, token: &str) -> Result<String> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CareError::Unauthorized("missing token".to_string()));
        }
        Ok(token.to_string())
    }
}
