//! Pure `World -> (system prompt, tool definitions)` construction.
//!
//! Nothing here touches the provider, the session store, or the clock —
//! the same [`tf_world::World`] snapshot always yields the same prompt
//! string, which is what lets the Turn Orchestrator treat "rebuild the
//! prompt" as a cheap, side-effect-free step.

use serde_json::json;
use tf_domain::tool::ToolDefinition;
use tf_world::World;

const INSTRUCTIONS: &str = r#"
You are the narrator and game master of an interactive text adventure.
Write vivid, second-person prose describing what the player character
experiences. Never speak as the player; only describe the world's
reaction to what they do.

Tool usage: call `moveToLocation` when the player's narration implies
they have physically travelled somewhere new. Call `advanceTime` when
meaningful time passes without travel. Call `discoverCharacter` the
moment you name a character who was not previously known to the player
— every named character must be discovered before or in the same turn
they are narrated as present.

Character discovery rule: if a tool result tells you to call
`discoverCharacter` for specific names, you must do so before
continuing the narration — the player cannot learn a character's
description or goals except through that tool.

Narrator constraints: never invent dialogue for the player character.
Never resolve a scene in a single line when the player's action implies
exploration or conversation. Keep prose grounded in the world state
given above; do not introduce locations or characters without using
the corresponding tool.

Examples:
1. Player says "I head to the market." -> call moveToLocation with
   destination="the market", narrativeTime appropriate to the time of
   day, accompaniedBy=[] unless companions were explicitly named.
2. Player says "Who is that by the well?" and an undiscovered character
   stands there -> call discoverCharacter with that character's name,
   a short introduction, and their goals, then narrate the encounter.
3. Player says "I wait for the rain to pass." -> call advanceTime with
   a narrativeTime reflecting the passage and a tick count appropriate
   to "waiting out the rain" (a handful of ticks, not hundreds).
"#;

/// Build the system prompt for the given world snapshot.
pub fn build_system_prompt(world: &World) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n{}\n\n", world.title, world.description));

    let player = world.player();
    let player_cluster = player.and_then(|p| world.cluster(p.current_location_cluster_id));

    out.push_str("## Current location\n");
    out.push_str(match player_cluster {
        Some(c) => c.canonical_name.as_str(),
        None => "Unknown",
    });
    out.push_str("\n\n");

    out.push_str("## Other known locations\n");
    let mut other_names: Vec<&str> = world
        .clusters
        .values()
        .filter(|c| Some(c.id) != player_cluster.map(|p| p.id))
        .map(|c| c.canonical_name.as_str())
        .collect();
    other_names.sort_unstable();
    if other_names.is_empty() {
        out.push_str("None yet");
    } else {
        out.push_str(&other_names.join(", "));
    }
    out.push_str("\n\n");

    out.push_str("## Time\n");
    out.push_str(&format!("{} (tick {})\n\n", world.narrative_time, world.tick));

    out.push_str("## Characters present\n");
    if let Some(cluster) = player_cluster {
        let present = world.discovered_at(cluster.id);
        if present.is_empty() {
            out.push_str("(No one else is here)\n");
        } else {
            for c in &present {
                out.push_str(&format!("- {}: {}\n", c.name, c.description));
                let knowledge = c.visible_knowledge();
                if !knowledge.is_empty() {
                    let joined: Vec<&str> = knowledge.iter().map(|k| k.content.as_str()).collect();
                    out.push_str(&format!("  Knows: {}\n", joined.join("; ")));
                }
            }
        }

        let hidden = world.undiscovered_at(cluster.id);
        if !hidden.is_empty() {
            let names: Vec<&str> = hidden.iter().map(|c| c.name.as_str()).collect();
            out.push_str(&format!("\n## Hidden hint\nSomeone unnamed lurks here: {}\n", names.join(", ")));
        }
    } else {
        out.push_str("(No one else is here)\n");
    }
    out.push('\n');

    let recent = world.recent_events();
    if !recent.is_empty() {
        out.push_str("## Recent events\n");
        for e in recent {
            out.push_str(&format!("- {}\n", e.description));
        }
        out.push('\n');
    }

    out.push_str(INSTRUCTIONS.trim());
    out.push('\n');

    out
}

/// Build the three-tool schema exposed to the model. Independent of the
/// world snapshot today, but takes it for symmetry with `build_system_prompt`
/// and in case a future tool's schema needs to vary with world state.
pub fn build_tool_definitions(_world: &World) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "moveToLocation".into(),
            description: "Move the player to a new or existing location.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "destination": { "type": "string", "description": "Where the player is going, in the player's own words" },
                    "narrativeTime": { "type": "string", "description": "Human-readable time of day after the move" },
                    "accompaniedBy": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Names of characters travelling with the player"
                    }
                },
                "required": ["destination", "narrativeTime", "accompaniedBy"]
            }),
        },
        ToolDefinition {
            name: "advanceTime".into(),
            description: "Advance the world clock without moving the player.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "narrativeTime": { "type": "string", "description": "Human-readable time of day after the wait" },
                    "ticks": { "type": "number", "description": "Ticks elapsed" }
                },
                "required": ["narrativeTime", "ticks"]
            }),
        },
        ToolDefinition {
            name: "discoverCharacter".into(),
            description: "Reveal a character's identity, description, and goals to the player.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "characterName": { "type": "string" },
                    "introduction": { "type": "string", "description": "Short description of the character" },
                    "goals": { "type": "string" }
                },
                "required": ["characterName", "introduction", "goals"]
            }),
        },
    ]
}
