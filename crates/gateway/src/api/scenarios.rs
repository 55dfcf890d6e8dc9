//! `POST /v1/scenarios` — load a scenario and start a new session from it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use tf_world::Scenario;

use crate::state::AppState;

pub async fn create_scenario(State(state): State<AppState>, Json(scenario): Json<Scenario>) -> impl IntoResponse {
    let record = match state.sessions.create() {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("failed to create session: {e}") })),
            )
                .into_response()
        }
    };

    if let Err(e) = state.worlds.create_from_scenario(record.session_id, scenario) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("invalid scenario: {e}") })),
        )
            .into_response();
    }

    if let Err(e) = state.worlds.persist(record.session_id) {
        tracing::warn!(session_id = %record.session_id, error = %e, "failed to persist freshly created world");
    }

    (StatusCode::CREATED, Json(serde_json::json!({ "session_id": record.session_id }))).into_response()
}
