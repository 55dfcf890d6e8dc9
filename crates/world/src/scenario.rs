use serde::{Deserialize, Serialize};

use crate::error::{Result, WorldError};
use crate::model::{Character, World};

/// The external, serializable scenario format (SPEC_FULL.md §6). A gateway
/// endpoint deserializes one of these from uploaded JSON and turns it into
/// a live [`World`] via [`World::from_scenario`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub initial_narrative_time: String,
    pub locations: Vec<ScenarioLocation>,
    pub characters: Vec<ScenarioCharacter>,
    #[serde(default)]
    pub player_starting_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioLocation {
    pub canonical_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioCharacter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goals: String,
    pub location_ref: String,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub encounter_chance: f32,
    #[serde(default)]
    pub is_discovered: bool,
}

impl World {
    /// Build a fresh `World` from an imported scenario. Fails if a
    /// character references a location not present in `locations`, or if
    /// no character is marked `isPlayer`.
    pub fn from_scenario(scenario: Scenario) -> Result<World> {
        let mut world = World::new(
            scenario.title,
            scenario.description,
            if scenario.initial_narrative_time.is_empty() {
                "Morning".to_string()
            } else {
                scenario.initial_narrative_time
            },
        );

        for loc in &scenario.locations {
            world.add_location(loc.canonical_name.clone());
        }

        let mut saw_player = false;
        for ch in scenario.characters {
            let mut cluster_name = ch.location_ref.clone();
            if ch.is_player {
                if let Some(ref start) = scenario.player_starting_location {
                    cluster_name = start.clone();
                }
            }
            let cluster = world
                .find_cluster_by_name(&cluster_name)
                .ok_or_else(|| WorldError::UnknownClusterName(cluster_name.clone()))?
                .id;

            let id = uuid::Uuid::new_v4();
            world.characters.insert(
                id,
                Character {
                    id,
                    name: ch.name,
                    description: ch.description,
                    current_location_cluster_id: cluster,
                    knowledge: Vec::new(),
                    relationships: Vec::new(),
                    is_player: ch.is_player,
                    is_discovered: ch.is_discovered || ch.is_player,
                    encounter_chance: ch.encounter_chance,
                    goals: ch.goals,
                    created_by_message_id: None,
                },
            );
            saw_player |= ch.is_player;
        }

        if !saw_player {
            return Err(WorldError::NoPlayerCharacter);
        }

        Ok(world)
    }

    /// Export the world back into the external scenario format, e.g. for a
    /// session snapshot download. Character `locationRef` is the cluster's
    /// current canonical name, so a round-tripped export reflects played
    /// state rather than the scenario's original layout.
    pub fn to_scenario(&self) -> Scenario {
        let locations = self
            .clusters
            .values()
            .map(|c| ScenarioLocation {
                canonical_name: c.canonical_name.clone(),
            })
            .collect();

        let characters = self
            .characters
            .values()
            .map(|c| ScenarioCharacter {
                name: c.name.clone(),
                description: c.description.clone(),
                goals: c.goals.clone(),
                location_ref: self
                    .cluster(c.current_location_cluster_id)
                    .map(|cl| cl.canonical_name.clone())
                    .unwrap_or_default(),
                is_player: c.is_player,
                encounter_chance: c.encounter_chance,
                is_discovered: c.is_discovered,
            })
            .collect();

        Scenario {
            title: self.title.clone(),
            description: self.description.clone(),
            initial_narrative_time: self.narrative_time.clone(),
            locations,
            characters,
            player_starting_location: self
                .player()
                .and_then(|p| self.cluster(p.current_location_cluster_id))
                .map(|c| c.canonical_name.clone()),
        }
    }
}
