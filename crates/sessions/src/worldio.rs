//! Durable storage for a session's [`tf_world::World`] snapshot.
//!
//! The world only needs to survive process restarts, not every mutation —
//! callers persist after each turn completes, not per tool call.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use tf_domain::error::{Error, Result};
use tf_world::World;

pub struct WorldFileStore {
    base_dir: PathBuf,
}

impl WorldFileStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    fn path(&self, session_id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{session_id}.json"))
    }

    pub fn save(&self, session_id: Uuid, world: &World) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(Error::Io)?;
        let json = serde_json::to_string_pretty(world)?;
        std::fs::write(self.path(session_id), json).map_err(Error::Io)
    }

    pub fn load(&self, session_id: Uuid) -> Result<Option<World>> {
        let path = self.path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}
