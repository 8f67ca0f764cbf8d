//! REST API over the server-side record store.

pub mod handlers;
pub mod response;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{CARDS_PATH, UPLOADS_PATH};
use crate::config::ServerConfig;
use crate::store::{RecordStore, SqliteStore};

/// Room for the text fields that travel with the photo.
const FORM_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: u64,
}

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let body_limit = usize::try_from(state.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES))
        .unwrap_or(usize::MAX);
    let uploads = ServeDir::new(&state.uploads_dir);

    let cards = Router::new()
        .route(
            CARDS_PATH,
            get(handlers::list_cards).post(handlers::create_card),
        )
        .route(
            &format!("{CARDS_PATH}/{{roll_number}}"),
            get(handlers::get_card).delete(handlers::delete_card),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    Router::new()
        .route("/livez", get(handlers::livez))
        .merge(cards)
        .nest_service(UPLOADS_PATH, uploads)
        .layer(TraceLayer::new_for_http())
}

/// Open the database and uploads directory named by `config`.
pub fn open_state(config: &ServerConfig) -> Result<AppState> {
    if let Some(parent) = config.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&config.database)
        .with_context(|| format!("failed to open database {}", config.database.display()))?;
    std::fs::create_dir_all(&config.uploads_dir)
        .with_context(|| format!("failed to create {}", config.uploads_dir.display()))?;
    Ok(AppState {
        store: Arc::new(store),
        uploads_dir: config.uploads_dir.clone(),
        max_upload_bytes: config.max_upload_bytes,
    })
}

pub async fn serve(config: &ServerConfig) -> Result<()> {
    let state = open_state(config)?;
    let app = build_app(state, config.request_timeout_seconds);

    let ip: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("invalid server host '{}'", config.host))?;
    let addr = SocketAddr::new(ip, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, database = %config.database.display(), "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
