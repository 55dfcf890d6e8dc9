use serde::{Deserialize, Serialize};

/// Configuration for the single chat provider this engine talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Identifier used in logs and error messages.
    pub id: String,
    /// Base URL of the OpenAI-compatible chat-completions endpoint, e.g.
    /// `https://api.openai.com/v1`.
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    /// Model used when a request doesn't override it.
    pub default_model: String,
    /// Per-attempt request timeout.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "TALEFORGE_PROVIDER_API_KEY".into(),
            default_model: "gpt-4o".into(),
            timeout_secs: 120,
        }
    }
}
