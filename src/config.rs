//! Participant configuration
//!
//! Host-facing knobs loaded from the environment with sensible defaults.
//! The host builds a `ParticipantConfig` (via `from_env` or literally) and
//! hands it to the controller, so tests can construct configs inline.

use std::str::FromStr;

/// Public documentation site linked when a docs answer comes from the
/// general model instead of the docs service.
pub const DEFAULT_DOCS_LINK: &str = "https://www.mongodb.com/docs/";

#[derive(Debug, Clone)]
pub struct ParticipantConfig {
    /// Base URL of the docs chatbot service. `None` disables the docs
    /// backend entirely; docs-intent questions go to the general model.
    pub docs_chatbot_base_url: Option<String>,
    /// Link used for the fallback documentation citation.
    pub docs_link: String,
    /// Timeout for outbound docs chatbot requests, in seconds.
    pub docs_request_timeout: u64,
    /// Whether telemetry events are emitted at all.
    pub telemetry_enabled: bool,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            docs_chatbot_base_url: None,
            docs_link: DEFAULT_DOCS_LINK.to_string(),
            docs_request_timeout: 30,
            telemetry_enabled: true,
        }
    }
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            clean_val.parse::<T>().unwrap_or(default)
        }
        Err(_) => default,
    }
}

impl ParticipantConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            docs_chatbot_base_url: std::env::var("MDB_DOCS_CHATBOT_BASE_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            docs_link: env_var_or("MDB_DOCS_LINK", DEFAULT_DOCS_LINK.to_string()),
            docs_request_timeout: env_var_or("MDB_DOCS_REQUEST_TIMEOUT", 30),
            telemetry_enabled: env_var_or("MDB_TELEMETRY_ENABLED", true),
        }
    }
}
