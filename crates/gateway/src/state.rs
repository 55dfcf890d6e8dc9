//! Shared application state, grouped by concern the way the teacher's
//! `gateway::state::AppState` does — just with almost everything that
//! doesn't have a SPEC_FULL.md counterpart removed.

use std::sync::Arc;

use tf_engine::{CancelMap, SessionLockMap};
use tf_providers::OpenAiCompatProvider;
use tf_sessions::{SessionRegistry, TranscriptStore};

use crate::config::Config;
use crate::registry::WorldRegistry;

#[derive(Clone)]
pub struct AppState {
    // Core
    pub config: Arc<Config>,
    pub provider: Arc<OpenAiCompatProvider>,

    // Session & world management
    pub sessions: Arc<SessionRegistry>,
    pub transcripts: Arc<TranscriptStore>,
    pub worlds: Arc<WorldRegistry>,
    pub session_locks: Arc<SessionLockMap>,
    pub cancel_map: Arc<CancelMap>,

    // Security
    pub api_token_hash: Option<Arc<Vec<u8>>>,
}

impl AppState {
    pub fn build(config: Config, state_dir: &std::path::Path) -> anyhow::Result<Self> {
        let provider = OpenAiCompatProvider::from_config(&config.provider)?;
        let api_token_hash = config.api_token().map(|token| {
            use sha2::{Digest, Sha256};
            Arc::new(Sha256::digest(token.as_bytes()).to_vec())
        });

        if api_token_hash.is_none() {
            tracing::warn!(
                env_var = %config.server.api_token_env,
                "no API token configured — running in dev mode with unauthenticated access"
            );
        }

        Ok(Self {
            config: Arc::new(config),
            provider: Arc::new(provider),
            sessions: Arc::new(SessionRegistry::new(&state_dir.join("sessions"))?),
            transcripts: Arc::new(TranscriptStore::new(&state_dir.join("transcripts"))),
            worlds: Arc::new(WorldRegistry::new(&state_dir.join("worlds"))),
            session_locks: Arc::new(SessionLockMap::new()),
            cancel_map: Arc::new(CancelMap::new()),
            api_token_hash,
        })
    }
}
