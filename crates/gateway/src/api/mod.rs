pub mod auth;
pub mod health;
pub mod scenarios;
pub mod sessions;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (`/v1/health`, no auth required) and
/// **protected** (everything else, gated behind the
/// `TALEFORGE_API_TOKEN` bearer-token middleware) — mirroring the
/// teacher's `public`/`protected`-split-then-merge router shape.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health::health));

    let protected = Router::new()
        .route("/v1/scenarios", post(scenarios::create_scenario))
        .route("/v1/sessions/:id", get(sessions::session_summary))
        .route("/v1/sessions/:id/turn", post(sessions::turn))
        .route("/v1/sessions/:id/stop", post(sessions::stop_session))
        .route("/v1/sessions/:id/export", get(sessions::export_session))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token));

    public.merge(protected).layer(tower_http::trace::TraceLayer::new_for_http())
}
