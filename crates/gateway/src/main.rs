//! Gateway binary entry point: load config, build `AppState`, bind, serve.
//!
//! No CLI subcommands (serve/doctor/config/version) here — this gateway
//! has exactly one job, so it boots straight to `serve`.

use std::path::PathBuf;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use tf_gateway::config::Config;
use tf_gateway::state::AppState;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::var("TALEFORGE_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let state_dir = std::env::var("TALEFORGE_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./taleforge-state"));

    let host = config.server.host.clone();
    let port = config.server.port;

    let state = AppState::build(config, &state_dir)?;

    let app = tf_gateway::api::router(state.clone())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "taleforge gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
