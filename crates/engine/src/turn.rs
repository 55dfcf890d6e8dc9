//! Turn Orchestrator (SPEC_FULL.md §4.7) — the loop that streams a
//! completion, dispatches any tool calls it contains, refreshes the
//! system prompt, and repeats until the model stops calling tools or the
//! loop budget is spent.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use tf_domain::stream::StreamEvent;
use tf_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};
use tf_domain::trace::TraceEvent;
use tf_providers::{ChatRequest, LlmProvider, ToolChoice};
use tf_sessions::{ChatMessage, ChatRole, SessionRegistry, TranscriptStore};
use tf_world::WorldStore;

use crate::cancel::{CancelMap, CancelToken};
use crate::{prompt_builder, simulator, tools, trimmer};

/// The tool-calling loop runs at most this many streamed completions per
/// turn. If the model still wants to call tools on the last iteration,
/// those calls are dropped rather than executed (§8 boundary behavior).
pub const MAX_TOOL_STEPS: usize = 5;

/// Ticks a `Send` entry point spends just on the player composing their
/// message, independent of any in-fiction action.
const SEND_TICK_COST: u64 = 1;

/// Off-screen simulation only triggers once this many ticks have
/// accumulated since it last ran.
const SIM_TRIGGER_TICKS: u64 = 5;

#[derive(Debug, Clone)]
pub enum TurnKind {
    Send(String),
    Continue,
    Regenerate,
}

#[derive(Debug, Clone)]
pub struct TurnInput {
    pub session_id: Uuid,
    pub session_key: String,
    pub kind: TurnKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    #[serde(rename = "token")]
    Token { text: String },
    #[serde(rename = "tool_call")]
    ToolCallEvent { call_id: String, tool_name: String, arguments: Value },
    #[serde(rename = "tool_result")]
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(rename = "done")]
    Done { content: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "stopped")]
    Stopped,
}

pub struct TurnDeps {
    pub world: Arc<WorldStore>,
    pub provider: Arc<dyn LlmProvider>,
    pub transcripts: Arc<TranscriptStore>,
    pub sessions: Arc<SessionRegistry>,
    pub cancel_map: Arc<CancelMap>,
}

/// Register a cancel token for `input.session_key`, spawn the turn, and
/// clean the token up when it finishes — mirroring the teacher's
/// `run_turn`/`run_turn_inner` split.
pub fn spawn_turn(deps: Arc<TurnDeps>, input: TurnInput) -> tokio::sync::mpsc::Receiver<TurnEvent> {
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let cancel = deps.cancel_map.register(&input.session_key);
    let session_key = input.session_key.clone();
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("turn", session_id = %input.session_id, %run_id, kind = ?input.kind);

    tokio::spawn(
        async move {
            run_turn_inner(&deps, input, tx, &cancel, run_id).await;
            deps.cancel_map.remove(&session_key);
        }
        .instrument(span),
    );

    rx
}

fn chat_message_to_message(m: &ChatMessage) -> Message {
    match m.role {
        ChatRole::User => Message::user(m.content.clone()),
        ChatRole::Assistant => Message::assistant(m.content.clone()),
    }
}

fn build_assistant_tool_message(text: &str, tool_calls: &[ToolCall]) -> Message {
    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(ContentPart::Text { text: text.to_string() });
    }
    for tc in tool_calls {
        parts.push(ContentPart::ToolUse {
            id: tc.call_id.clone(),
            name: tc.tool_name.clone(),
            input: tc.arguments.clone(),
        });
    }
    Message { role: Role::Assistant, content: MessageContent::Parts(parts) }
}

async fn run_turn_inner(deps: &TurnDeps, input: TurnInput, tx: tokio::sync::mpsc::Sender<TurnEvent>, cancel: &CancelToken, run_id: Uuid) {
    let session_id_str = input.session_id.to_string();
    let turn_started = Instant::now();
    let turn_kind_str = match &input.kind {
        TurnKind::Send(_) => "send",
        TurnKind::Continue => "continue",
        TurnKind::Regenerate => "regenerate",
    };
    tracing::debug!(session_id = %session_id_str, kind = turn_kind_str, "turn started");
    TraceEvent::TurnStarted { session_id: session_id_str.clone(), kind: turn_kind_str.to_string() }.emit();
    let mut tool_loops: u32 = 0;

    match &input.kind {
        TurnKind::Send(user_text) => {
            if let Err(e) = deps.transcripts.append(&session_id_str, &ChatMessage::user(user_text.clone())) {
                let _ = tx.send(TurnEvent::Error { message: format!("failed to persist user message: {e}") }).await;
                return;
            }
            deps.world.mutate(|w| w.advance_time(SEND_TICK_COST, ""));
        }
        TurnKind::Continue => {}
        TurnKind::Regenerate => {
            let mut messages = match deps.transcripts.read(&session_id_str) {
                Ok(m) => m,
                Err(e) => {
                    let _ = tx.send(TurnEvent::Error { message: format!("failed to load transcript: {e}") }).await;
                    return;
                }
            };
            if matches!(messages.last().map(|m| m.role), Some(ChatRole::Assistant)) {
                messages.pop();
                if let Err(e) = deps.transcripts.overwrite(&session_id_str, &messages) {
                    let _ = tx.send(TurnEvent::Error { message: format!("failed to rewrite transcript: {e}") }).await;
                    return;
                }
            }
        }
    }

    let tick_before = deps.world.snapshot().tick;
    let player_cluster_before = deps.world.snapshot().player().map(|p| p.current_location_cluster_id);

    let mut snapshot = deps.world.snapshot();
    let mut system_prompt = prompt_builder::build_system_prompt(&snapshot);
    let mut tool_defs = prompt_builder::build_tool_definitions(&snapshot);

    let persisted = match deps.transcripts.read(&session_id_str) {
        Ok(m) => m,
        Err(e) => {
            let _ = tx.send(TurnEvent::Error { message: format!("failed to load transcript: {e}") }).await;
            return;
        }
    };
    let history_messages: Vec<Message> = persisted.iter().map(chat_message_to_message).collect();
    let history = trimmer::trim(&system_prompt, &history_messages);

    let mut msgs: Vec<Message> = Vec::with_capacity(history.len() + 1);
    msgs.push(Message::system(system_prompt.clone()));
    msgs.extend(history);

    let mut accumulated_text = String::new();
    let mut was_cancelled = false;

    for step in 0..MAX_TOOL_STEPS {
        if cancel.is_cancelled() {
            was_cancelled = true;
            break;
        }

        tracing::debug!(session_id = %session_id_str, step, "tool loop iteration");

        let req = ChatRequest {
            messages: msgs.clone(),
            tools: tool_defs.clone(),
            tool_choice: ToolChoice::Auto,
            max_tokens: Some(2048),
            model: None,
        };

        let llm_call_span = tracing::info_span!("llm.call", step, "otel.kind" = "CLIENT");
        let mut stream = match deps
            .provider
            .chat_stream(&req)
            .instrument(llm_call_span)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(session_id = %session_id_str, error = %e, "llm call failed");
                let _ = tx.send(TurnEvent::Error { message: e.to_string() }).await;
                return;
            }
        };

        let mut step_text = String::new();
        let mut pending_tool_calls: Vec<ToolCall> = Vec::new();
        let mut tc_bufs: std::collections::HashMap<String, (String, String)> = std::collections::HashMap::new();

        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                was_cancelled = true;
                break;
            }
            let event = match event {
                Ok(e) => e,
                Err(e) => {
                    let _ = tx.send(TurnEvent::Error { message: e.to_string() }).await;
                    return;
                }
            };
            match event {
                StreamEvent::Token { text } => {
                    let _ = tx.send(TurnEvent::Token { text: text.clone() }).await;
                    step_text.push_str(&text);
                }
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    tc_bufs.insert(call_id, (tool_name, String::new()));
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    if let Some((_, args)) = tc_bufs.get_mut(&call_id) {
                        args.push_str(&delta);
                    }
                }
                StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                    pending_tool_calls.push(ToolCall { call_id, tool_name, arguments });
                    // The provider drains every buffered tool call in one batch when
                    // it emits `ToolCallFinished`, so any entries still in `tc_bufs`
                    // at this point are already accounted for above.
                    tc_bufs.clear();
                }
                StreamEvent::Done { .. } => {}
                StreamEvent::Error { message } => {
                    let _ = tx.send(TurnEvent::Error { message }).await;
                    return;
                }
            }
        }

        for (call_id, (tool_name, args_str)) in tc_bufs.drain() {
            let arguments = if args_str.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&args_str).unwrap_or_else(|_| Value::Object(Default::default()))
            };
            pending_tool_calls.push(ToolCall { call_id, tool_name, arguments });
        }

        accumulated_text.push_str(&step_text);

        if was_cancelled {
            break;
        }

        if pending_tool_calls.is_empty() {
            break;
        }

        if step == MAX_TOOL_STEPS - 1 {
            // Loop budget exhausted with tool calls still pending: they are
            // dropped, not executed (§8).
            break;
        }

        msgs.push(build_assistant_tool_message(&step_text, &pending_tool_calls));
        tool_loops += 1;

        for tc in &pending_tool_calls {
            if cancel.is_cancelled() {
                was_cancelled = true;
                break;
            }
            let _ = tx
                .send(TurnEvent::ToolCallEvent {
                    call_id: tc.call_id.clone(),
                    tool_name: tc.tool_name.clone(),
                    arguments: tc.arguments.clone(),
                })
                .await;

            tracing::debug!(session_id = %session_id_str, tool_name = %tc.tool_name, call_id = %tc.call_id, "dispatching tool call");
            let (content, is_error) = tools::dispatch_tool(&deps.world, deps.provider.as_ref(), &tc.tool_name, &tc.arguments).await;
            if is_error {
                tracing::warn!(session_id = %session_id_str, tool_name = %tc.tool_name, call_id = %tc.call_id, %content, "tool dispatch returned an error");
            }

            TraceEvent::ToolDispatched {
                tool_name: tc.tool_name.clone(),
                call_id: tc.call_id.clone(),
                is_error,
            }
            .emit();
            if !is_error {
                TraceEvent::WorldMutated {
                    session_id: session_id_str.clone(),
                    mutation: tc.tool_name.clone(),
                }
                .emit();
            }

            let _ = tx
                .send(TurnEvent::ToolResult {
                    call_id: tc.call_id.clone(),
                    tool_name: tc.tool_name.clone(),
                    content: content.clone(),
                    is_error,
                })
                .await;

            msgs.push(Message::tool_result(&tc.call_id, &content));
        }

        if was_cancelled {
            break;
        }

        snapshot = deps.world.snapshot();
        system_prompt = prompt_builder::build_system_prompt(&snapshot);
        tool_defs = prompt_builder::build_tool_definitions(&snapshot);
        msgs[0] = Message::system(system_prompt.clone());
    }

    if was_cancelled {
        let _ = tx.send(TurnEvent::Stopped).await;
        return;
    }

    if let Err(e) = deps.transcripts.append(&session_id_str, &ChatMessage::assistant(accumulated_text.clone())) {
        let _ = tx.send(TurnEvent::Error { message: format!("failed to persist assistant message: {e}") }).await;
        return;
    }

    auto_discover(&deps.world, &accumulated_text);

    let tick_after = deps.world.snapshot().tick;
    let player_cluster_after = deps.world.snapshot().player().map(|p| p.current_location_cluster_id);
    let delta_ticks = tick_after.saturating_sub(tick_before);
    let _ = deps.sessions.record_activity(input.session_id, delta_ticks);

    if player_cluster_before != player_cluster_after {
        if let Some(record) = deps.sessions.get(input.session_id) {
            if record.ticks_since_last_sim >= SIM_TRIGGER_TICKS {
                simulator::run_simulation(&deps.world, deps.provider.as_ref(), &session_id_str, record.ticks_since_last_sim).await;
                let _ = deps.sessions.reset_sim_counter(input.session_id);
            }
        }
    }

    tracing::debug!(session_id = %session_id_str, %run_id, tool_loops, duration_ms = turn_started.elapsed().as_millis() as u64, "turn completed");
    TraceEvent::TurnCompleted {
        session_id: session_id_str,
        run_id: run_id.to_string(),
        tool_loops,
        duration_ms: turn_started.elapsed().as_millis() as u64,
    }
    .emit();

    let _ = tx.send(TurnEvent::Done { content: accumulated_text }).await;
}

/// After the loop, scan the accumulated assistant text for exact-substring
/// occurrences of any undiscovered character's name at the player's
/// cluster and discover each match. Affects future prompts only.
fn auto_discover(world: &WorldStore, accumulated_text: &str) {
    world.mutate(|w| {
        let Some(player) = w.player() else { return };
        let cluster_id = player.current_location_cluster_id;
        let matches: Vec<_> = w
            .undiscovered_at(cluster_id)
            .into_iter()
            .filter(|c| accumulated_text.contains(&c.name))
            .map(|c| c.id)
            .collect();
        for id in matches {
            let _ = w.discover_character(id);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as PLMutex;
    use tf_domain::capability::LlmCapabilities;
    use tf_domain::error::Result as DomainResult;
    use tf_domain::stream::BoxStream;
    use tf_providers::ChatResponse;
    use tf_world::{Character, World};

    /// A provider stub whose canned `chat`/`chat_stream` responses are
    /// consumed one at a time, in order, regardless of which method is called.
    struct ScriptedProvider {
        chat_stream_script: PLMutex<Vec<(String, Vec<ToolCall>)>>,
        chat_script: PLMutex<Vec<ChatResponse>>,
        capabilities: LlmCapabilities,
    }

    impl ScriptedProvider {
        fn new(chat_stream_script: Vec<(String, Vec<ToolCall>)>) -> Self {
            Self {
                chat_stream_script: PLMutex::new(chat_stream_script),
                chat_script: PLMutex::new(Vec::new()),
                capabilities: LlmCapabilities::default(),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _req: &ChatRequest) -> DomainResult<ChatResponse> {
            let mut script = self.chat_script.lock();
            if script.is_empty() {
                return Ok(ChatResponse {
                    content: String::new(),
                    tool_calls: vec![],
                    usage: None,
                    model: "stub".into(),
                    finish_reason: Some("stop".into()),
                });
            }
            Ok(script.remove(0))
        }

        async fn chat_stream(&self, _req: &ChatRequest) -> DomainResult<BoxStream<'static, DomainResult<StreamEvent>>> {
            let (text, tool_calls) = {
                let mut script = self.chat_stream_script.lock();
                if script.is_empty() {
                    (String::new(), vec![])
                } else {
                    script.remove(0)
                }
            };

            let mut events = vec![Ok(StreamEvent::Token { text })];
            for tc in tool_calls {
                events.push(Ok(StreamEvent::ToolCallStarted { call_id: tc.call_id.clone(), tool_name: tc.tool_name.clone() }));
                events.push(Ok(StreamEvent::ToolCallFinished { call_id: tc.call_id, tool_name: tc.tool_name, arguments: tc.arguments }));
            }
            events.push(Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }));

            Ok(Box::pin(futures_util::stream::iter(events)))
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    fn tankard_world() -> (World, tf_world::ClusterId) {
        let mut world = World::new("The Dusty Tankard", "A lone inn on the trade road.", "Evening");
        let cluster = world.add_location("The Dusty Tankard");
        world.characters.insert(
            Uuid::new_v4(),
            Character {
                id: Uuid::new_v4(),
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
        (world, cluster)
    }

    fn test_deps(world: World, provider: ScriptedProvider) -> (Arc<TurnDeps>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let deps = Arc::new(TurnDeps {
            world: Arc::new(WorldStore::new(world)),
            provider: Arc::new(provider),
            transcripts: Arc::new(TranscriptStore::new(dir.path())),
            sessions: Arc::new(SessionRegistry::new(dir.path()).unwrap()),
            cancel_map: Arc::new(CancelMap::new()),
        });
        (deps, dir)
    }

    #[tokio::test]
    async fn no_op_turn_persists_text_and_advances_one_tick() {
        let (world, _) = tankard_world();
        let provider = ScriptedProvider::new(vec![("You glance around the tavern.".into(), vec![])]);
        let (deps, _dir) = test_deps(world, provider);

        let record = deps.sessions.create().unwrap();

        let mut rx = spawn_turn(
            deps.clone(),
            TurnInput { session_id: record.session_id, session_key: "s1".into(), kind: TurnKind::Send("look around".into()) },
        );

        let mut final_content = None;
        while let Some(event) = rx.recv().await {
            if let TurnEvent::Done { content } = event {
                final_content = Some(content);
            }
        }

        assert_eq!(final_content.as_deref(), Some("You glance around the tavern."));
        assert_eq!(deps.world.snapshot().tick, 1);
    }

    #[tokio::test]
    async fn single_step_movement_advances_tick_by_move_cost_plus_send_cost() {
        let (world, _) = tankard_world();
        let move_call = ToolCall {
            call_id: "call1".into(),
            tool_name: "moveToLocation".into(),
            arguments: serde_json::json!({ "destination": "the market", "narrativeTime": "Midday", "accompaniedBy": [] }),
        };
        let provider = ScriptedProvider {
            chat_stream_script: PLMutex::new(vec![
                (String::new(), vec![move_call]),
                ("You arrive at the market.".into(), vec![]),
            ]),
            chat_script: PLMutex::new(vec![ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    call_id: "resolve1".into(),
                    tool_name: "resolveLocation".into(),
                    arguments: serde_json::json!({
                        "matchedClusterId": null,
                        "canonicalName": "The Market",
                        "confidence": 0.9
                    }),
                }],
                usage: None,
                model: "stub".into(),
                finish_reason: Some("tool_calls".into()),
            }]),
            capabilities: LlmCapabilities::default(),
        };
        let (deps, _dir) = test_deps(world, provider);
        let record = deps.sessions.create().unwrap();

        let mut rx = spawn_turn(
            deps.clone(),
            TurnInput { session_id: record.session_id, session_key: "s1".into(), kind: TurnKind::Send("I walk to the market".into()) },
        );

        while rx.recv().await.is_some() {}

        // initial 0 + 1 (send) + 5 (move cost) = 6
        assert_eq!(deps.world.snapshot().tick, 6);
        assert!(deps.world.snapshot().find_cluster_by_name("The Market").is_some());
    }

    #[tokio::test]
    async fn auto_discovery_marks_mentioned_character_discovered() {
        let (mut world, cluster) = tankard_world();
        let aldo = world.introduce_character("Aldo", "", "", cluster, false, None).unwrap();
        let provider = ScriptedProvider::new(vec![("Aldo approaches you with a grin.".into(), vec![])]);
        let (deps, _dir) = test_deps(world, provider);
        let record = deps.sessions.create().unwrap();

        let mut rx = spawn_turn(
            deps.clone(),
            TurnInput { session_id: record.session_id, session_key: "s1".into(), kind: TurnKind::Send("look around".into()) },
        );
        while rx.recv().await.is_some() {}

        assert!(deps.world.snapshot().character(aldo).unwrap().is_discovered);
    }
}
