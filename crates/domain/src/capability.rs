use serde::{Deserialize, Serialize};

/// What a configured chat provider can do. Queried once at startup and held
/// alongside the provider handle; not re-negotiated per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCapabilities {
    pub supports_tools: bool,
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
}

impl Default for LlmCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: true,
            supports_streaming: true,
            supports_json_mode: false,
        }
    }
}
