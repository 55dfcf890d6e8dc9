//! Tool dispatch for the three world-mutating tools the model can call:
//! `moveToLocation`, `advanceTime`, `discoverCharacter` (SPEC_FULL.md §4.7).
//!
//! Each dispatcher returns `(result_text, is_error)` — a malformed call or
//! an invariant violation is reported back to the model as a tool result
//! rather than aborting the turn (§7 `ToolArgumentInvalid`/`InvariantViolation`).

use serde::Deserialize;
use serde_json::Value;

use tf_providers::LlmProvider;
use tf_world::{CharacterId, WorldError, WorldStore};

use crate::location_resolver::{resolve_location, LocationResolution};

/// Ticks a `moveToLocation` call costs, independent of distance.
pub const MOVE_COST_TICKS: u64 = 5;

pub async fn dispatch_tool(
    world: &WorldStore,
    provider: &dyn LlmProvider,
    tool_name: &str,
    arguments: &Value,
) -> (String, bool) {
    match tool_name {
        "moveToLocation" => dispatch_move_to_location(world, provider, arguments).await,
        "advanceTime" => dispatch_advance_time(world, arguments),
        "discoverCharacter" => dispatch_discover_character(world, arguments),
        other => (format!("unknown tool: {other}"), true),
    }
}

#[derive(Debug, Deserialize)]
struct MoveArgs {
    destination: String,
    #[serde(rename = "narrativeTime")]
    narrative_time: String,
    #[serde(rename = "accompaniedBy", default)]
    accompanied_by: Vec<String>,
}

async fn dispatch_move_to_location(world: &WorldStore, provider: &dyn LlmProvider, arguments: &Value) -> (String, bool) {
    let args: MoveArgs = match serde_json::from_value(arguments.clone()) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "invalid moveToLocation arguments");
            return (format!("invalid moveToLocation arguments: {e}"), true);
        }
    };

    let clusters: Vec<tf_world::LocationCluster> = world.mutate(|w| w.clusters.values().cloned().collect());
    let resolution = resolve_location(provider, &args.destination, &clusters).await;

    world.mutate(|w| {
        let player_id = match w.player_id() {
            Ok(id) => id,
            Err(e) => return (format!("{e}"), true),
        };
        let old_cluster_id = w.character(player_id).map(|c| c.current_location_cluster_id);

        let cluster_id = match resolution {
            LocationResolution::Existing(id) => id,
            LocationResolution::NewCluster(ref name) => w.add_location(name.clone()),
        };

        let companions: Vec<CharacterId> = old_cluster_id
            .map(|old_id| {
                w.characters_at(old_id)
                    .into_iter()
                    .filter(|c| args.accompanied_by.iter().any(|name| name.eq_ignore_ascii_case(&c.name)))
                    .map(|c| c.id)
                    .collect()
            })
            .unwrap_or_default();

        for companion_id in &companions {
            let _ = w.move_character(*companion_id, cluster_id);
        }
        if let Err(e) = w.move_player_to(cluster_id) {
            return (format!("{e}"), true);
        }
        w.advance_time(MOVE_COST_TICKS, &args.narrative_time);

        let destination_name = w
            .cluster(cluster_id)
            .map(|c| c.canonical_name.clone())
            .unwrap_or_else(|| "an unknown place".to_string());

        let discovered = w.discovered_at(cluster_id);
        let undiscovered = w.undiscovered_at(cluster_id);

        let mut result = format!("The player arrives at {destination_name}.");
        if discovered.is_empty() && undiscovered.is_empty() {
            result.push_str(" No one else is here.");
        } else if !discovered.is_empty() {
            let names: Vec<&str> = discovered.iter().map(|c| c.name.as_str()).collect();
            result.push_str(&format!(" Present: {}.", names.join(", ")));
        }
        if !undiscovered.is_empty() {
            let names: Vec<&str> = undiscovered.iter().map(|c| c.name.as_str()).collect();
            result.push_str(&format!(
                " You must call discoverCharacter for each of the following before continuing the narration: {}.",
                names.join(", ")
            ));
        }
        (result, false)
    })
}

#[derive(Debug, Deserialize)]
struct AdvanceTimeArgs {
    #[serde(rename = "narrativeTime")]
    narrative_time: String,
    ticks: f64,
}

fn dispatch_advance_time(world: &WorldStore, arguments: &Value) -> (String, bool) {
    let args: AdvanceTimeArgs = match serde_json::from_value(arguments.clone()) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "invalid advanceTime arguments");
            return (format!("invalid advanceTime arguments: {e}"), true);
        }
    };
    if args.ticks < 0.0 {
        return (WorldError::NegativeTicks(args.ticks as i64).to_string(), true);
    }

    world.mutate(|w| {
        w.advance_time(args.ticks as u64, &args.narrative_time);
        (format!("Time advances. It is now {} (tick {}).", w.narrative_time, w.tick), false)
    })
}

#[derive(Debug, Deserialize)]
struct DiscoverCharacterArgs {
    #[serde(rename = "characterName")]
    character_name: String,
    introduction: String,
    goals: String,
}

fn dispatch_discover_character(world: &WorldStore, arguments: &Value) -> (String, bool) {
    let args: DiscoverCharacterArgs = match serde_json::from_value(arguments.clone()) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "invalid discoverCharacter arguments");
            return (format!("invalid discoverCharacter arguments: {e}"), true);
        }
    };

    world.mutate(|w| {
        let player_cluster = match w.player().map(|p| p.current_location_cluster_id) {
            Some(id) => id,
            None => return ("no player character exists".to_string(), true),
        };

        let existing = w
            .undiscovered_at(player_cluster)
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(&args.character_name))
            .map(|c| c.id);

        if let Some(id) = existing {
            let _ = w.discover_character(id);
            if let Some(character) = w.characters.get_mut(&id) {
                character.description = args.introduction.clone();
                character.goals = args.goals.clone();
            }
            return (format!("{} is now known to the player.", args.character_name), false);
        }

        match w.introduce_character(args.character_name.clone(), args.introduction.clone(), args.goals.clone(), player_cluster, true, None) {
            Ok(_) => (format!("{} is now known to the player.", args.character_name), false),
            Err(e) => (format!("{e}"), true),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tf_world::World;

    fn world_with_player_and_npc() -> (WorldStore, tf_world::ClusterId, CharacterId) {
        let mut world = World::new("T", "D", "Morning");
        let cluster = world.add_location("The Dusty Tankard");
        let player_id = uuid::Uuid::new_v4();
        world.characters.insert(
            player_id,
            tf_world::Character {
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
        let npc = world.introduce_character("Grim", "A barkeep", "", cluster, false, None).unwrap();
        (WorldStore::new(world), cluster, npc)
    }

    #[test]
    fn advance_time_reports_new_narrative_time() {
        let (store, _, _) = world_with_player_and_npc();
        let (text, is_error) = dispatch_advance_time(&store, &serde_json::json!({"narrativeTime": "Midday", "ticks": 3}));
        assert!(!is_error);
        assert!(text.contains("Midday"));
        assert_eq!(store.snapshot().tick, 3);
    }

    #[test]
    fn advance_time_rejects_negative_ticks() {
        let (store, _, _) = world_with_player_and_npc();
        let (_, is_error) = dispatch_advance_time(&store, &serde_json::json!({"narrativeTime": "", "ticks": -1}));
        assert!(is_error);
    }

    #[test]
    fn discover_character_marks_existing_undiscovered_character() {
        let (store, _, npc) = world_with_player_and_npc();
        let (text, is_error) = dispatch_discover_character(
            &store,
            &serde_json::json!({"characterName": "Grim", "introduction": "A gruff barkeep", "goals": "Keep the peace"}),
        );
        assert!(!is_error);
        assert!(text.contains("Grim"));
        assert!(store.snapshot().character(npc).unwrap().is_discovered);
    }

    #[test]
    fn discover_character_introduces_new_character_when_absent() {
        let (store, cluster, _) = world_with_player_and_npc();
        let (text, is_error) = dispatch_discover_character(
            &store,
            &serde_json::json!({"characterName": "Aldo", "introduction": "A wandering merchant", "goals": "Sell wares"}),
        );
        assert!(!is_error);
        assert!(text.contains("Aldo"));
        let world = store.snapshot();
        let aldo = world.find_character_by_name("Aldo").unwrap();
        assert!(aldo.is_discovered);
        assert_eq!(aldo.current_location_cluster_id, cluster);
    }

    #[test]
    fn discover_character_twice_is_idempotent() {
        let (store, _, npc) = world_with_player_and_npc();
        for _ in 0..2 {
            dispatch_discover_character(
                &store,
                &serde_json::json!({"characterName": "Grim", "introduction": "A barkeep", "goals": ""}),
            );
        }
        assert!(store.snapshot().character(npc).unwrap().is_discovered);
    }
}
