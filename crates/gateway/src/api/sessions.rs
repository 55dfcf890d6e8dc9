//! Session lifecycle endpoints: summary, turn (SSE + synchronous JSON),
//! stop, and scenario-shaped export. Grounded in the teacher's
//! `api/chat.rs` (turn dispatch, SSE framing) and `api/sessions.rs`
//! (session-scoped CRUD).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::Stream;
use serde::Deserialize;
use uuid::Uuid;

use tf_engine::{TurnDeps, TurnInput, TurnKind};
use tf_providers::LlmProvider;

use crate::state::AppState;

fn not_found(session_id: Uuid) -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": format!("no session {session_id}") }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn session_summary(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Response {
    let Ok(Some(world)) = state.worlds.get(session_id) else {
        return not_found(session_id);
    };
    let snapshot = world.snapshot();
    let player = snapshot.player();
    let location = player
        .and_then(|p| snapshot.cluster(p.current_location_cluster_id))
        .map(|c| c.canonical_name.clone());
    let discovered_count = snapshot.characters.values().filter(|c| c.is_discovered).count();

    Json(serde_json::json!({
        "session_id": session_id,
        "tick": snapshot.tick,
        "narrative_time": snapshot.narrative_time,
        "player_location": location,
        "discovered_count": discovered_count,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:id/export
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn export_session(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Response {
    let Ok(Some(world)) = state.worlds.get(session_id) else {
        return not_found(session_id);
    };
    Json(world.snapshot().to_scenario()).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:id/stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stop_session(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Response {
    let stopped = state.cancel_map.cancel(&session_id.to_string());
    Json(serde_json::json!({ "stopped": stopped })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:id/turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TurnKindBody {
    Send,
    Continue,
    Regenerate,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequestBody {
    kind: TurnKindBody,
    #[serde(default)]
    message: Option<String>,
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

pub async fn turn(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<TurnRequestBody>,
) -> Response {
    let Ok(Some(world)) = state.worlds.get(session_id) else {
        return not_found(session_id);
    };

    let kind = match body.kind {
        TurnKindBody::Send => match body.message {
            Some(m) => TurnKind::Send(m),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "\"send\" requires a message" })),
                )
                    .into_response()
            }
        },
        TurnKindBody::Continue => TurnKind::Continue,
        TurnKindBody::Regenerate => TurnKind::Regenerate,
    };

    let session_key = session_id.to_string();
    let permit = match state.session_locks.acquire(&session_key).await {
        Ok(p) => p,
        Err(_) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "error": "session is busy — a turn is already in progress" })),
            )
                .into_response()
        }
    };

    let provider: Arc<dyn LlmProvider> = state.provider.clone();
    let deps = Arc::new(TurnDeps {
        world,
        provider,
        transcripts: state.transcripts.clone(),
        sessions: state.sessions.clone(),
        cancel_map: state.cancel_map.clone(),
    });

    let mut rx = tf_engine::spawn_turn(deps, TurnInput { session_id, session_key, kind });

    if wants_json(&headers) {
        let mut final_event = None;
        while let Some(event) = rx.recv().await {
            match &event {
                tf_engine::TurnEvent::Done { .. } | tf_engine::TurnEvent::Error { .. } | tf_engine::TurnEvent::Stopped => {
                    final_event = Some(event);
                }
                _ => {}
            }
        }
        drop(permit);
        if let Err(e) = state.worlds.persist(session_id) {
            tracing::warn!(session_id = %session_id, error = %e, "failed to persist world after turn");
        }
        let final_event = final_event.unwrap_or(tf_engine::TurnEvent::Error {
            message: "turn ended without a terminal event".into(),
        });
        return Json(final_event).into_response();
    }

    // The lock permit is moved into the generator so it releases exactly
    // when the stream is fully drained or dropped (client disconnect),
    // mirroring the teacher's `make_sse_stream` pattern. The world is
    // persisted once at the end, not per event.
    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, std::convert::Infallible>> + Send>> = Box::pin(async_stream::stream! {
        let _permit = permit;
        while let Some(event) = rx.recv().await {
            let event_type = match &event {
                tf_engine::TurnEvent::Token { .. } => "token",
                tf_engine::TurnEvent::ToolCallEvent { .. } => "tool_call",
                tf_engine::TurnEvent::ToolResult { .. } => "tool_result",
                tf_engine::TurnEvent::Done { .. } => "done",
                tf_engine::TurnEvent::Error { .. } => "error",
                tf_engine::TurnEvent::Stopped => "stopped",
            };
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            yield Ok::<Event, std::convert::Infallible>(Event::default().event(event_type).data(data));
        }
        if let Err(e) = state.worlds.persist(session_id) {
            tracing::warn!(session_id = %session_id, error = %e, "failed to persist world after streamed turn");
        }
    });

    Sse::new(stream).into_response()
}
