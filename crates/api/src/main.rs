use std::net::SocketAddr;

use anyhow::{Context, Result};
use folio_api::{build_router, build_state, spawn_housekeeping, ApiConfig};
use folio_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();
    init_tracing("folio_api");

    let config = ApiConfig::from_env()?;
    let state = build_state(&config)?;
    spawn_housekeeping(state.clone(), config.session_purge_interval);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(
        bind = %config.bind,
        model = %config.gemini.model,
        dotenv = dotenv_loaded,
        "folio chat api started"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
