//! Session-to-world registry.
//!
//! `tf-engine` has no notion of multiple sessions — a `TurnDeps` wraps
//! exactly one `Arc<WorldStore>`. Multi-session support is this gateway's
//! job: keep one loaded `World` per session in memory, backed by
//! `tf_sessions::WorldFileStore` so state survives a restart.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use tf_domain::error::Result;
use tf_sessions::WorldFileStore;
use tf_world::{Scenario, World, WorldStore};

pub struct WorldRegistry {
    files: WorldFileStore,
    loaded: RwLock<HashMap<Uuid, Arc<WorldStore>>>,
}

impl WorldRegistry {
    pub fn new(base_dir: &std::path::Path) -> Self {
        Self {
            files: WorldFileStore::new(base_dir),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Build a new session's world from a scenario and register it.
    pub fn create_from_scenario(&self, session_id: Uuid, scenario: Scenario) -> std::result::Result<Arc<WorldStore>, tf_world::WorldError> {
        let world = World::from_scenario(scenario)?;
        let store = Arc::new(WorldStore::new(world));
        self.loaded.write().insert(session_id, store.clone());
        Ok(store)
    }

    /// Fetch an already-loaded world, or load it from disk. `None` if no
    /// session with this id has ever been created.
    pub fn get(&self, session_id: Uuid) -> Result<Option<Arc<WorldStore>>> {
        if let Some(store) = self.loaded.read().get(&session_id) {
            return Ok(Some(store.clone()));
        }
        match self.files.load(session_id)? {
            Some(world) => {
                let store = Arc::new(WorldStore::new(world));
                self.loaded.write().insert(session_id, store.clone());
                Ok(Some(store))
            }
            None => Ok(None),
        }
    }

    /// Persist the current in-memory snapshot for `session_id` to disk.
    /// Called once per completed turn, never per tool call.
    pub fn persist(&self, session_id: Uuid) -> Result<()> {
        if let Some(store) = self.loaded.read().get(&session_id) {
            self.files.save(session_id, &store.snapshot())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tf_world::{Scenario, ScenarioCharacter, ScenarioLocation};

    fn sample_scenario() -> Scenario {
        Scenario {
            title: "The Dusty Tankard".into(),
            description: "A cozy tavern scenario.".into(),
            initial_narrative_time: "Evening".into(),
            locations: vec![ScenarioLocation { canonical_name: "The Dusty Tankard".into() }],
            characters: vec![ScenarioCharacter {
                name: "You".into(),
                description: String::new(),
                goals: String::new(),
                location_ref: "The Dusty Tankard".into(),
                is_player: true,
                encounter_chance: 0.0,
                is_discovered: true,
            }],
            player_starting_location: Some("The Dusty Tankard".into()),
        }
    }

    #[test]
    fn create_then_get_returns_same_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorldRegistry::new(dir.path());
        let id = Uuid::new_v4();
        registry.create_from_scenario(id, sample_scenario()).unwrap();
        assert!(registry.get(id).unwrap().is_some());
    }

    #[test]
    fn unknown_session_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorldRegistry::new(dir.path());
        assert!(registry.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn persist_then_reload_from_fresh_registry_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        {
            let registry = WorldRegistry::new(dir.path());
            registry.create_from_scenario(id, sample_scenario()).unwrap();
            registry.persist(id).unwrap();
        }
        let registry2 = WorldRegistry::new(dir.path());
        let store = registry2.get(id).unwrap().unwrap();
        assert_eq!(store.snapshot().title, "The Dusty Tankard");
    }
}
