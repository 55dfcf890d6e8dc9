use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WorldError};

pub type ClusterId = Uuid;
pub type CharacterId = Uuid;

const MAX_VISIBLE_KNOWLEDGE: usize = 3;
const MAX_VISIBLE_EVENTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationCluster {
    pub id: ClusterId,
    pub canonical_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSource {
    Witnessed,
    Told,
    Inferred,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub id: Uuid,
    pub content: String,
    pub acquired_at_tick: u64,
    pub source: KnowledgeSource,
    #[serde(default)]
    pub source_character_id: Option<CharacterId>,
}

impl KnowledgeEntry {
    pub fn new(
        content: impl Into<String>,
        acquired_at_tick: u64,
        source: KnowledgeSource,
        source_character_id: Option<CharacterId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            acquired_at_tick,
            source,
            source_character_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub description: String,
    pub current_location_cluster_id: ClusterId,
    /// Append-only; the prompt builder surfaces only the most recent
    /// [`MAX_VISIBLE_KNOWLEDGE`] entries, but all of them are retained.
    #[serde(default)]
    pub knowledge: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub relationships: Vec<String>,
    pub is_player: bool,
    pub is_discovered: bool,
    #[serde(default)]
    pub encounter_chance: f32,
    #[serde(default)]
    pub goals: String,
    #[serde(default)]
    pub created_by_message_id: Option<Uuid>,
}

impl Character {
    /// The knowledge entries the prompt builder should show: the most
    /// recent three, oldest first.
    pub fn visible_knowledge(&self) -> &[KnowledgeEntry] {
        let len = self.knowledge.len();
        let start = len.saturating_sub(MAX_VISIBLE_KNOWLEDGE);
        &self.knowledge[start..]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub description: String,
    pub at_tick: u64,
}

/// The mutable state of one play session: scenario metadata, the location
/// graph, every character (player included), the event journal, and the
/// clock. Exactly one `World` per session; all mutation goes through its
/// methods, which enforce the invariants in SPEC_FULL.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub title: String,
    pub description: String,
    pub tick: u64,
    pub narrative_time: String,
    pub clusters: HashMap<ClusterId, LocationCluster>,
    pub characters: HashMap<CharacterId, Character>,
    pub events: Vec<Event>,
}

impl World {
    pub fn new(title: impl Into<String>, description: impl Into<String>, narrative_time: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            tick: 0,
            narrative_time: narrative_time.into(),
            clusters: HashMap::new(),
            characters: HashMap::new(),
            events: Vec::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn player(&self) -> Option<&Character> {
        self.characters.values().find(|c| c.is_player)
    }

    pub fn player_id(&self) -> Result<CharacterId> {
        self.player().map(|c| c.id).ok_or(WorldError::NoPlayerCharacter)
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&LocationCluster> {
        self.clusters.get(&id)
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn find_cluster_by_name(&self, name: &str) -> Option<&LocationCluster> {
        self.clusters
            .values()
            .find(|c| c.canonical_name.eq_ignore_ascii_case(name))
    }

    pub fn find_character_by_name(&self, name: &str) -> Option<&Character> {
        self.characters.values().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Non-player, discovered characters at `cluster_id`, in a stable order
    /// (sorted by name) so the prompt is deterministic.
    pub fn discovered_at(&self, cluster_id: ClusterId) -> Vec<&Character> {
        let mut v: Vec<&Character> = self
            .characters
            .values()
            .filter(|c| !c.is_player && c.is_discovered && c.current_location_cluster_id == cluster_id)
            .collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }

    /// Non-player, undiscovered characters at `cluster_id`.
    pub fn undiscovered_at(&self, cluster_id: ClusterId) -> Vec<&Character> {
        let mut v: Vec<&Character> = self
            .characters
            .values()
            .filter(|c| !c.is_player && !c.is_discovered && c.current_location_cluster_id == cluster_id)
            .collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }

    /// All non-player characters (any discovery state) at `cluster_id`.
    pub fn characters_at(&self, cluster_id: ClusterId) -> Vec<&Character> {
        self.characters
            .values()
            .filter(|c| !c.is_player && c.current_location_cluster_id == cluster_id)
            .collect()
    }

    pub fn recent_events(&self) -> &[Event] {
        let len = self.events.len();
        let start = len.saturating_sub(MAX_VISIBLE_EVENTS);
        &self.events[start..]
    }

    // ── Mutations ────────────────────────────────────────────────

    pub fn advance_time(&mut self, ticks: u64, narrative_time: &str) {
        self.tick += ticks;
        if !narrative_time.is_empty() {
            self.narrative_time = narrative_time.to_string();
        }
    }

    pub fn add_location(&mut self, canonical_name: impl Into<String>) -> ClusterId {
        let id = Uuid::new_v4();
        self.clusters.insert(
            id,
            LocationCluster {
                id,
                canonical_name: canonical_name.into(),
            },
        );
        id
    }

    pub fn move_player_to(&mut self, cluster_id: ClusterId) -> Result<()> {
        let player_id = self.player_id()?;
        self.move_character(player_id, cluster_id)
    }

    pub fn move_character(&mut self, char_id: CharacterId, cluster_id: ClusterId) -> Result<()> {
        if !self.clusters.contains_key(&cluster_id) {
            return Err(WorldError::UnknownCluster(cluster_id));
        }
        let character = self
            .characters
            .get_mut(&char_id)
            .ok_or(WorldError::UnknownCharacter(char_id))?;
        character.current_location_cluster_id = cluster_id;
        Ok(())
    }

    pub fn discover_character(&mut self, char_id: CharacterId) -> Result<()> {
        let character = self
            .characters
            .get_mut(&char_id)
            .ok_or(WorldError::UnknownCharacter(char_id))?;
        character.is_discovered = true;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn introduce_character(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        goals: impl Into<String>,
        at_cluster_id: ClusterId,
        discovered: bool,
        created_by_message_id: Option<Uuid>,
    ) -> Result<CharacterId> {
        if !self.clusters.contains_key(&at_cluster_id) {
            return Err(WorldError::UnknownCluster(at_cluster_id));
        }
        let id = Uuid::new_v4();
        self.characters.insert(
            id,
            Character {
                id,
                name: name.into(),
                description: description.into(),
                current_location_cluster_id: at_cluster_id,
                knowledge: Vec::new(),
                relationships: Vec::new(),
                is_player: false,
                is_discovered: discovered,
                encounter_chance: 1.0,
                goals: goals.into(),
                created_by_message_id,
            },
        );
        Ok(id)
    }

    pub fn append_knowledge(&mut self, char_id: CharacterId, entry: KnowledgeEntry) -> Result<()> {
        let character = self
            .characters
            .get_mut(&char_id)
            .ok_or(WorldError::UnknownCharacter(char_id))?;
        character.knowledge.push(entry);
        Ok(())
    }

    pub fn append_event(&mut self, description: impl Into<String>, at_tick: u64) {
        self.events.push(Event {
            description: description.into(),
            at_tick,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_player_and_cluster() -> (World, ClusterId, CharacterId) {
        let mut world = World::new("Title", "Desc", "Morning");
        let cluster = world.add_location("The Dusty Tankard");
        let player_id = Uuid::new_v4();
        world.characters.insert(
            player_id,
            Character {
                id: player_id,
                name: "Player".into(),
                description: String::new(),
                current_location_cluster_id: cluster,
                knowledge: Vec::new(),
                relationships: Vec::new(),
                is_player: true,
                is_discovered: true,
                encounter_chance: 0.0,
                goals: String::new(),
                created_by_message_id: None,
            },
        );
        (world, cluster, player_id)
    }

    #[test]
    fn advance_time_accumulates_ticks_and_keeps_narrative_time_when_empty() {
        let (mut world, _, _) = world_with_player_and_cluster();
        world.advance_time(5, "");
        assert_eq!(world.tick, 5);
        assert_eq!(world.narrative_time, "Morning");
        world.advance_time(0, "Midday");
        assert_eq!(world.tick, 5);
        assert_eq!(world.narrative_time, "Midday");
    }

    #[test]
    fn move_player_to_unknown_cluster_is_rejected() {
        let (mut world, _, _) = world_with_player_and_cluster();
        let bogus = Uuid::new_v4();
        assert_eq!(world.move_player_to(bogus), Err(WorldError::UnknownCluster(bogus)));
    }

    #[test]
    fn discover_character_is_idempotent() {
        let (mut world, cluster, _) = world_with_player_and_cluster();
        let npc = world
            .introduce_character("Grim", "A barkeep", "", cluster, false, None)
            .unwrap();
        assert!(!world.character(npc).unwrap().is_discovered);
        world.discover_character(npc).unwrap();
        assert!(world.character(npc).unwrap().is_discovered);
        world.discover_character(npc).unwrap();
        assert!(world.character(npc).unwrap().is_discovered);
    }

    #[test]
    fn visible_knowledge_caps_at_three_most_recent() {
        let (mut world, cluster, _) = world_with_player_and_cluster();
        let npc = world
            .introduce_character("Grim", "", "", cluster, true, None)
            .unwrap();
        for i in 0..5 {
            world
                .append_knowledge(
                    npc,
                    KnowledgeEntry::new(format!("fact {i}"), i, KnowledgeSource::Witnessed, None),
                )
                .unwrap();
        }
        let visible = world.character(npc).unwrap().visible_knowledge();
        assert_eq!(visible.len(), 3);
        assert_eq!(visible[0].content, "fact 2");
        assert_eq!(visible[2].content, "fact 4");
    }

    #[test]
    fn recent_events_caps_at_five_in_chronological_order() {
        let (mut world, _, _) = world_with_player_and_cluster();
        for i in 0..8 {
            world.append_event(format!("event {i}"), i);
        }
        let recent = world.recent_events();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].description, "event 3");
        assert_eq!(recent[4].description, "event 7");
    }

    #[test]
    fn discovered_at_excludes_player_and_undiscovered() {
        let (mut world, cluster, _) = world_with_player_and_cluster();
        let other = world.add_location("The Market");
        let seen = world
            .introduce_character("Grim", "", "", cluster, true, None)
            .unwrap();
        let _hidden = world
            .introduce_character("Aldo", "", "", cluster, false, None)
            .unwrap();
        let _elsewhere = world
            .introduce_character("Mira", "", "", other, true, None)
            .unwrap();

        let present = world.discovered_at(cluster);
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].id, seen);
    }
}
