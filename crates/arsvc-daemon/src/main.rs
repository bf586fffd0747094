//! arsvc-daemon entry point.
//!
//! This file is intentionally thin: it loads configuration, connects the
//! durable and ephemeral stores, runs startup recovery, wires the router,
//! and starts the HTTP server. All route handlers live in `routes.rs`; all
//! shared state lives in `state.rs`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use arsvc_cache::EphemeralStore;
use arsvc_config::AppConfig;
use arsvc_daemon::{recovery, routes, state};
use arsvc_queue::WorkQueue;
use arsvc_store::JobStore;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config = Arc::new(AppConfig::from_env().context("failed to load configuration")?);

    let pool = arsvc_db::connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    arsvc_db::migrate(&pool).await.context("failed to run migrations")?;

    let cache = EphemeralStore::connect(&config.redis_url)
        .await
        .context("failed to connect to Redis (cache)")?;
    let queue = WorkQueue::connect(&config.redis_url)
        .await
        .context("failed to connect to Redis (queue)")?;

    match recovery::recover_stale_jobs(&pool, &cache, config.stale_running_threshold).await {
        Ok(n) if n > 0 => info!(recovered = n, "startup recovery marked abandoned jobs as failed"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "startup recovery failed, continuing anyway"),
    }

    let store = JobStore::new(pool, cache, config.job_ttl);
    let app_state = state::AppState::new(store, queue, Arc::clone(&config));

    let app = routes::build_router(app_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
    info!("arsvc-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(arsvc_config::ENV_DAEMON_ADDR).ok()?.parse().ok()
}
