//! oxen-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config,
//! connects to Postgres, builds the shared state, wires middleware, and
//! starts the HTTP server. All route handlers live in `routes.rs`; all
//! shared state types live in `state.rs`.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use oxen_config::{ProcessorConfig, QueueConfig};
use oxen_daemon::{routes, state};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_paths = config_paths_from_env();
    let path_refs: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = oxen_config::load_layered_yaml(&path_refs)
        .context("failed to load layered config (set OXEN_CONFIG_PATHS)")?;

    let queue_cfg = QueueConfig::from_config_json(&loaded.config_json)?;
    queue_cfg.validate()?;

    let processors = processors_from_config(&loaded.config_json)?;
    for cfg in processors.values() {
        cfg.validate()?;
    }

    let db_secret = oxen_config::resolve_db_url(&loaded.config_json)?;
    let processor_list: Vec<ProcessorConfig> = processors.values().cloned().collect();
    let max_connections =
        oxen_config::resolve_max_connections(&loaded.config_json, &processor_list)?;
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&db_secret.url)
        .await
        .context("failed to connect to Postgres")?;
    oxen_db::migrate(&pool).await?;

    let store = oxen_db::Store::new(pool).with_extra_fields(queue_cfg.extra_fields.clone());
    let shared = Arc::new(state::AppState::new(store, processors, queue_cfg));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    spawn_signal_shutdown(shared.clone());

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("oxen-daemon listening on http://{}", addr);

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
    std::env::var("OXEN_DAEMON_ADDR").ok()?.parse().ok()
}

/// Comma-separated layer paths in merge order (base -> env -> local). Empty
/// if unset — `load_layered_yaml` then yields an empty config and every
/// `QueueConfig`/`ProcessorConfig` falls back to its defaults (no
/// processors registered, so `run start` 404s until configured).
fn config_paths_from_env() -> Vec<String> {
    std::env::var("OXEN_CONFIG_PATHS")
        .ok()
        .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}

fn processors_from_config(
    config_json: &serde_json::Value,
) -> anyhow::Result<HashMap<String, ProcessorConfig>> {
    let mut out = HashMap::new();
    let Some(entries) = config_json.pointer("/processors").and_then(|v| v.as_array()) else {
        return Ok(out);
    };
    for entry in entries {
        let cfg: ProcessorConfig = serde_json::from_value(entry.clone())
            .context("invalid /processors entry in config")?;
        out.insert(cfg.job_type.clone(), cfg);
    }
    Ok(out)
}

/// Graceful OS-signal shutdown: on Ctrl-C, drain every running processor
/// before the process exits.
fn spawn_signal_shutdown(shared: Arc<state::AppState>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal, draining in-flight jobs");
            let mut controller = shared.controller.lock().await;
            if let Err(e) = controller.shutdown().await {
                tracing::error!(error = %e, "error during shutdown drain");
            }
            std::process::exit(0);
        }
    });
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
