//! Off-screen Simulator (SPEC_FULL.md §4.6).
//!
//! Advances characters the player isn't currently with, so the world feels
//! lived-in without the orchestrator narrating every cluster every turn.

use serde::Deserialize;
use serde_json::json;

use tf_domain::tool::{Message, ToolDefinition};
use tf_domain::trace::TraceEvent;
use tf_providers::{ChatRequest, LlmProvider, ToolChoice};
use tf_world::WorldStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimDepth {
    None,
    Summary,
    Full,
}

/// Depth is nominally a function of elapsed ticks *and* whether an
/// unresolved plot point exists at the cohort's cluster. No plot-point
/// detector exists yet (see DESIGN.md's Open Questions) so `has_plot_point`
/// is always `false` today; the parameter is kept so a future detector can
/// plug in without changing this function's shape.
pub fn select_depth(elapsed_ticks: u64, has_plot_point: bool) -> SimDepth {
    let _ = has_plot_point;
    match elapsed_ticks {
        0..=10 => SimDepth::None,
        11..=20 => SimDepth::Summary,
        _ => SimDepth::Full,
    }
}

/// `max(min(elapsedTicks/2, 8), 1)`, computed in floating point per the spec
/// wording, then truncated to a whole number of dialogue turns.
pub fn dialogue_turn_count(elapsed_ticks: u64) -> u64 {
    let half = elapsed_ticks as f64 / 2.0;
    half.min(8.0).max(1.0) as u64
}

/// Run the simulator for every eligible cohort. No-ops at `SimDepth::None`.
pub async fn run_simulation(world: &WorldStore, provider: &dyn LlmProvider, session_id: &str, elapsed_ticks: u64) {
    let depth = select_depth(elapsed_ticks, false);
    if depth == SimDepth::None {
        return;
    }

    let snapshot = world.snapshot();
    let player_cluster = snapshot.player().map(|p| p.current_location_cluster_id);

    let cohorts: Vec<_> = snapshot
        .clusters
        .values()
        .filter(|cluster| Some(cluster.id) != player_cluster)
        .map(|cluster| (cluster, snapshot.characters_at(cluster.id)))
        .filter(|(_, cohort)| cohort.len() >= 2)
        .collect();

    tracing::debug!(session_id, depth = ?depth, cohorts = cohorts.len(), "simulation run");
    TraceEvent::SimulationRun {
        session_id: session_id.to_string(),
        depth: format!("{depth:?}"),
        cohorts: cohorts.len(),
    }
    .emit();

    for (cluster, cohort) in &cohorts {
        match depth {
            SimDepth::Summary => run_summary(world, provider, &snapshot, cluster, cohort).await,
            SimDepth::Full => run_full(world, provider, &snapshot, cluster, cohort, elapsed_ticks).await,
            SimDepth::None => unreachable!(),
        }
    }
}

fn cohort_description(cohort: &[&tf_world::Character]) -> String {
    cohort
        .iter()
        .map(|c| format!("- {} ({}): goals — {}", c.name, c.description, c.goals))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn run_summary(
    world: &WorldStore,
    provider: &dyn LlmProvider,
    snapshot: &tf_world::World,
    cluster: &tf_world::LocationCluster,
    cohort: &[&tf_world::Character],
) {
    let prompt = format!(
        "The following characters are together at {} while the player is elsewhere. Setting: {}\n\n{}\n\n\
         Write a 1-2 sentence summary of what they get up to off-screen.",
        cluster.canonical_name,
        snapshot.description,
        cohort_description(cohort),
    );

    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        tools: vec![],
        tool_choice: ToolChoice::Auto,
        max_tokens: Some(4096),
        model: None,
    };

    let summary = match provider.chat(&req).await {
        Ok(resp) => resp.content,
        Err(e) => {
            tracing::warn!(error = %e, "off-screen summary simulation failed");
            return;
        }
    };

    world.mutate(|w| {
        let tick = w.tick;
        w.append_event(summary, tick);
    });
}

fn report_simulation_tool() -> ToolDefinition {
    ToolDefinition {
        name: "reportSimulation".into(),
        description: "Report the notable events and character movements from an off-screen scene.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "events": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Notable world events that occurred"
                },
                "movements": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "characterName": { "type": "string" },
                            "destinationName": { "type": "string" }
                        },
                        "required": ["characterName", "destinationName"]
                    }
                }
            },
            "required": ["events", "movements"]
        }),
    }
}

#[derive(Debug, Deserialize)]
struct Movement {
    #[serde(rename = "characterName")]
    character_name: String,
    #[serde(rename = "destinationName")]
    destination_name: String,
}

#[derive(Debug, Deserialize)]
struct ReportSimulationArgs {
    events: Vec<String>,
    movements: Vec<Movement>,
}

async fn run_full(
    world: &WorldStore,
    provider: &dyn LlmProvider,
    snapshot: &tf_world::World,
    cluster: &tf_world::LocationCluster,
    cohort: &[&tf_world::Character],
    elapsed_ticks: u64,
) {
    let turns = dialogue_turn_count(elapsed_ticks);

    let dialogue_prompt = format!(
        "The following characters are together at {} while the player is elsewhere:\n{}\n\n\
         Write a scripted exchange of exactly {turns} dialogue turns between them. Format each \
         turn as CHARACTER_NAME: \"line\", with action descriptions in *asterisks*. If a character \
         decides to go somewhere else, that intent must be expressed in the dialogue itself.",
        cluster.canonical_name,
        cohort_description(cohort),
    );

    let dialogue_req = ChatRequest {
        messages: vec![Message::user(dialogue_prompt)],
        tools: vec![],
        tool_choice: ToolChoice::Auto,
        max_tokens: Some(4096),
        model: None,
    };

    let dialogue = match provider.chat(&dialogue_req).await {
        Ok(resp) => resp.content,
        Err(e) => {
            tracing::warn!(error = %e, "off-screen dialogue simulation failed");
            return;
        }
    };

    let mut cluster_names: Vec<&str> = snapshot.clusters.values().map(|c| c.canonical_name.as_str()).collect();
    cluster_names.sort_unstable();

    let extraction_prompt = format!(
        "The following scripted exchange happened off-screen:\n\n{dialogue}\n\n\
         Available locations: {}\n\n\
         Call reportSimulation with the notable events (as plain sentences) and any character \
         movements. A movement's destinationName must exactly match one of the available \
         locations; otherwise omit it.",
        cluster_names.join(", "),
    );

    let extraction_req = ChatRequest {
        messages: vec![Message::user(extraction_prompt)],
        tools: vec![report_simulation_tool()],
        tool_choice: ToolChoice::Required,
        max_tokens: Some(4096),
        model: None,
    };

    let response = match provider.chat(&extraction_req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "off-screen event extraction failed");
            return;
        }
    };

    let Some(call) = response.tool_calls.iter().find(|c| c.tool_name == "reportSimulation") else {
        tracing::warn!("reportSimulation tool call missing from provider response");
        return;
    };
    let args: ReportSimulationArgs = match serde_json::from_value(call.arguments.clone()) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "reportSimulation arguments malformed");
            return;
        }
    };

    let cohort_ids: Vec<tf_world::CharacterId> = cohort.iter().map(|c| c.id).collect();
    let knowledge_content = if args.events.is_empty() {
        dialogue.chars().take(240).collect::<String>()
    } else {
        args.events.join("; ")
    };

    world.mutate(|w| {
        let tick = w.tick;
        for event in &args.events {
            w.append_event(event.clone(), tick);
        }
        for movement in &args.movements {
            let matched_cluster = w
                .clusters
                .values()
                .find(|c| c.canonical_name.eq_ignore_ascii_case(&movement.destination_name))
                .map(|c| c.id);
            let matched_character = w.find_character_by_name(&movement.character_name).map(|c| c.id);
            if let (Some(cluster_id), Some(char_id)) = (matched_cluster, matched_character) {
                let _ = w.move_character(char_id, cluster_id);
            }
        }
        for char_id in &cohort_ids {
            let entry = tf_world::KnowledgeEntry::new(
                knowledge_content.clone(),
                tick,
                tf_world::KnowledgeSource::Witnessed,
                None,
            );
            let _ = w.append_knowledge(*char_id, entry);
        }
    });
}
