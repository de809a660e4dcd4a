use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    handlers::{create_note, get_note, health},
    service::{NoteService, DEFAULT_MAX_CONTENT_BYTES},
    store::{memory::DEFAULT_MAX_NOTES, MemoryStore},
    AppState,
};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How often unread expired notes are reclaimed ($SEALNOTE_SWEEP_INTERVAL, e.g. `5m`).
    pub sweep_interval: Duration,
    /// Live-note cap; creation fails with 503 beyond it.
    pub max_notes: usize,
    /// Largest accepted ciphertext, in bytes.
    pub max_content_bytes: usize,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl ServerConfig {
    /// Read every setting through `lookup`; missing or unparsable values
    /// fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("SEALNOTE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: lookup("SEALNOTE_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            sweep_interval: lookup("SEALNOTE_SWEEP_INTERVAL")
                .and_then(|v| humantime::parse_duration(&v).ok())
                .filter(|d| !d.is_zero())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
            max_notes: lookup("SEALNOTE_MAX_NOTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_NOTES),
            max_content_bytes: lookup("SEALNOTE_MAX_CONTENT_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONTENT_BYTES),
            cors_origins: lookup("SEALNOTE_CORS_ORIGINS"),
        }
    }
}

/// Build the HTTP routes over an already-constructed service.
pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/notes", post(create_note))
        .route("/api/notes/{id}", get(get_note))
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let store = MemoryStore::new(cfg.max_notes);
    store.clone().spawn_sweep(cfg.sweep_interval);

    let notes = NoteService::new(Arc::new(store)).with_max_content_bytes(cfg.max_content_bytes);
    let app = router(AppState { notes }, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(
        %addr,
        max_notes = cfg.max_notes,
        sweep_interval = %humantime::format_duration(cfg.sweep_interval),
        "sealnote server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    // Unread notes live only in this process and go with it.
    info!("sealnote server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<http::HeaderValue> = o
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
