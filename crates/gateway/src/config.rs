//! Gateway configuration.
//!
//! Loaded from an optional TOML file and overlaid with environment
//! variables, mirroring the teacher's `Config::load` pattern but reduced to
//! the handful of knobs this gateway actually has: where to bind, the
//! single chat provider, and the bearer token that gates everything but
//! `/v1/health`.

use serde::{Deserialize, Serialize};

use tf_providers::ProviderConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Name of the environment variable holding the bearer token that
    /// guards every route but `/v1/health`. Unset (the default) means dev
    /// mode: unauthenticated access, logged once as a warning.
    pub api_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8787,
            api_token_env: "TALEFORGE_API_TOKEN".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
}

impl Config {
    /// Load from `path` if it exists, falling back to defaults. No
    /// environment variables are read here beyond what `provider.api_key_env`
    /// and `server.api_token_env` *name* — their values are read lazily at
    /// the point of use, the same way the teacher's gateway defers reading
    /// `SA_API_TOKEN` until the auth middleware needs it.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// The resolved API token, if the configured environment variable is
    /// set and non-empty. `None` means dev mode.
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.server.api_token_env)
            .ok()
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = Config::load(Some(std::path::Path::new("/nonexistent/path.toml"))).unwrap();
        assert_eq!(cfg.server.port, 8787);
    }

    #[test]
    fn no_path_yields_defaults() {
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.provider.default_model, "gpt-4o");
    }
}
