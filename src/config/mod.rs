//! Configuration management for SonarCare
//!
//! Configuration is loaded from a JSON file with environment variable
//! overrides. A `.env` file is honored via dotenvy. Environment variables
//! follow the pattern `SONARCARE_SECTION_KEY`.

mod types;

pub use types::*;

use crate::error::{CareError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a path with environment overrides.
    ///
    /// A missing file yields the default configuration; environment
    /// variables are applied on top either way.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        // Server
        if let Ok(val) = std::env::var("SONARCARE_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("SONARCARE_SERVER_PORT") {
            if let Ok(v) = val.parse() {
                self.server.port = v;
            }
        }
        if let Ok(val) = std::env::var("SONARCARE_SERVER_ALLOWED_ORIGINS") {
            self.server.allowed_origins = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Backend
        if let Ok(val) = std::env::var("SONARCARE_BACKEND_API_KEY") {
            self.backend.api_key = val;
        }
        if let Ok(val) = std::env::var("SONARCARE_BACKEND_API_BASE") {
            self.backend.api_base = val;
        }
        if let Ok(val) = std::env::var("SONARCARE_BACKEND_MODEL") {
            self.backend.model = val;
        }
        if let Ok(val) = std::env::var("SONARCARE_BACKEND_LIGHT_MODEL") {
            self.backend.light_model = val;
        }
        if let Ok(val) = std::env::var("SONARCARE_BACKEND_RESEARCH_MODEL") {
            self.backend.research_model = val;
        }

        // Limits
        if let Ok(val) = std::env::var("SONARCARE_LIMITS_REPLY_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.limits.reply_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("SONARCARE_LIMITS_CHUNK_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.limits.chunk_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("SONARCARE_LIMITS_HISTORY_WINDOW") {
            if let Ok(v) = val.parse() {
                self.limits.history_window = v;
            }
        }
    }

    /// Validate the configuration for serving.
    ///
    /// Fails fast on settings the server cannot run without. Called at
    /// startup and by `sonarcare doctor`.
    pub fn validate(&self) -> Result<()> {
        if self.backend.api_key.trim().is_empty() {
            return Err(CareError::Config(
                "backend.api_key is not set (SONARCARE_BACKEND_API_KEY)".to_string(),
            ));
        }
        if self.backend.model.trim().is_empty()
            || self.backend.light_model.trim().is_empty()
            || self.backend.research_model.trim().is_empty()
        {
            return Err(CareError::Config(
                "backend model names must not be empty".to_string(),
            ));
        }
        if self.limits.reply_timeout_secs == 0 || self.limits.chunk_timeout_secs == 0 {
            return Err(CareError::Config(
                "limits timeouts must be greater than zero".to_string(),
            ));
        }
        if self.limits.dedup_capacity == 0 {
            return Err(CareError::Config(
                "limits.dedup_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
