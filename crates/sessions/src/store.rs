//! Session registry.
//!
//! Tracks the ambient envelope around a session's [`tf_world::World`]: its
//! id, lifecycle timestamps, and how many ticks have elapsed since the
//! off-screen simulator last ran (SPEC_FULL.md §3 "Ambient supplement").
//! Persisted as a single `sessions.json` file, mirroring the teacher's
//! gateway session store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tf_domain::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub ticks_since_last_sim: u64,
}

pub struct SessionRegistry {
    path: PathBuf,
    sessions: RwLock<HashMap<Uuid, SessionRecord>>,
}

impl SessionRegistry {
    pub fn new(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir).map_err(Error::Io)?;
        let path = state_dir.join("sessions.json");
        let sessions = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    fn persist(&self, sessions: &HashMap<Uuid, SessionRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(sessions)?;
        std::fs::write(&self.path, json).map_err(Error::Io)
    }

    pub fn create(&self) -> Result<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: Uuid::new_v4(),
            created_at: now,
            last_active_at: now,
            ticks_since_last_sim: 0,
        };
        let mut sessions = self.sessions.write();
        sessions.insert(record.session_id, record.clone());
        self.persist(&sessions)?;
        Ok(record)
    }

    pub fn get(&self, session_id: Uuid) -> Option<SessionRecord> {
        self.sessions.read().get(&session_id).cloned()
    }

    /// Update `last_active_at` and add `delta_ticks` to the
    /// simulation counter; called after every turn.
    pub fn record_activity(&self, session_id: Uuid, delta_ticks: u64) -> Result<()> {
        let mut sessions = self.sessions.write();
        if let Some(record) = sessions.get_mut(&session_id) {
            record.last_active_at = Utc::now();
            record.ticks_since_last_sim += delta_ticks;
        }
        self.persist(&sessions)
    }

    /// Reset the simulation counter to zero after a simulation run.
    pub fn reset_sim_counter(&self, session_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write();
        if let Some(record) = sessions.get_mut(&session_id) {
            record.ticks_since_last_sim = 0;
        }
        self.persist(&sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path()).unwrap();
        let record = registry.create().unwrap();
        let fetched = registry.get(record.session_id).unwrap();
        assert_eq!(fetched.session_id, record.session_id);
        assert_eq!(fetched.ticks_since_last_sim, 0);
    }

    #[test]
    fn record_activity_accumulates_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path()).unwrap();
        let record = registry.create().unwrap();
        registry.record_activity(record.session_id, 5).unwrap();
        registry.record_activity(record.session_id, 7).unwrap();
        assert_eq!(registry.get(record.session_id).unwrap().ticks_since_last_sim, 12);
    }

    #[test]
    fn reset_sim_counter_zeroes_it() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path()).unwrap();
        let record = registry.create().unwrap();
        registry.record_activity(record.session_id, 25).unwrap();
        registry.reset_sim_counter(record.session_id).unwrap();
        assert_eq!(registry.get(record.session_id).unwrap().ticks_since_last_sim, 0);
    }
}
