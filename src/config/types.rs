//! Configuration types for SonarCare
//!
//! Serde-backed structs mirroring the JSON config file layout. All fields
//! have defaults so a missing file yields a runnable development config
//! (apart from the backend API key, which `validate()` insists on).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Reasoning backend credentials and model selection
    #[serde(default)]
    pub backend: BackendConfig,
    /// Timeouts and cache bounds
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server listen address and browser-origin allowlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS. Empty means allow any origin (development).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Reasoning backend settings.
///
/// Three model hints cover the agent roster: `light_model` for greetings,
/// `model` for the grounded medical agents, `research_model` for the
/// deep-research and fact-check agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API key for the grounded-search backend
    #[serde(default)]
    pub api_key: String,
    /// Base URL override (tests point this at a local fixture server)
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Default model for grounded answers
    #[serde(default = "default_model")]
    pub model: String,
    /// Lightweight model for simple conversational turns
    #[serde(default = "default_light_model")]
    pub light_model: String,
    /// High-capability model for in-depth research answers
    #[serde(default = "default_research_model")]
    pub research_model: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            model: default_model(),
            light_model: default_light_model(),
            research_model: default_research_model(),
        }
    }
}

/// Timeouts and bounded-cache parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Bound on a whole batch agent run, seconds
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,
    /// Per-chunk inactivity bound for streaming runs, seconds
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_secs: u64,
    /// How many prior turns are replayed into an agent call
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Capacity of the duplicate-send and finalization caches
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    /// TTL of duplicate-send and finalization entries, seconds
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            reply_timeout_secs: default_reply_timeout(),
            chunk_timeout_secs: default_chunk_timeout(),
            history_window: default_history_window(),
            dedup_capacity: default_dedup_capacity(),
            dedup_ttl_secs: default_dedup_ttl(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_api_base() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_model() -> String {
    "sonar-medium-online".to_string()
}

fn default_light_model() -> String {
    "sonar-small-online".to_string()
}

fn default_research_model() -> String {
    "sonar-large-online".to_string()
}

fn default_reply_timeout() -> u64 {
    30
}

fn default_chunk_timeout() -> u64 {
    15
}

fn default_history_window() -> usize {
    10
}

fn default_dedup_capacity() -> usize {
    1000
}

fn default_dedup_ttl() -> u64 {
    300
}
