//! HTTP control surface: `/start`, `/stop` and `/status`, any method.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::any, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::monitor::{Monitor, MonitorState, MonitorStatus};
use crate::session::SessionFactory;

// ── Shared state ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    monitor: Monitor,
    /// Re-read on every `/start` so edits apply without a restart.
    config_path: PathBuf,
    sessions: Arc<dyn SessionFactory>,
    /// Held from the state check until the monitor owns the new session,
    /// so concurrent starts cannot each open a browser.
    starting: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(monitor: Monitor, config_path: PathBuf, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            monitor,
            config_path,
            sessions,
            starting: Arc::new(Mutex::new(())),
        }
    }
}

// ── Response body ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    /// `success`/`error` for start and stop, the monitor state for status.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorStatus>,
}

impl ControlResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.into()),
            monitor: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            monitor: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

type Reply = (StatusCode, Json<ControlResponse>);

fn ok(message: &str) -> Reply {
    (StatusCode::OK, Json(ControlResponse::success(message)))
}

fn fail(code: StatusCode, message: impl Into<String>) -> Reply {
    (code, Json(ControlResponse::error(message)))
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn start(State(state): State<AppState>) -> Reply {
    let Ok(_starting) = state.starting.try_lock() else {
        return fail(StatusCode::BAD_REQUEST, "Monitor is already starting.");
    };

    match state.monitor.state().await {
        MonitorState::Running => {
            return fail(StatusCode::BAD_REQUEST, "Monitor is already running.")
        }
        MonitorState::Stopping => {
            return fail(
                StatusCode::BAD_REQUEST,
                "Monitor is still stopping; try again shortly.",
            )
        }
        MonitorState::Idle => {}
    }

    info!("Loading configuration from: {}", state.config_path.display());
    let config = match Config::load(&state.config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to load configuration: {e}"),
            );
        }
    };

    let session = match state.sessions.open(&config.chat).await {
        Ok(session) => session,
        Err(e) => {
            error!("Browser setup failed: {}", e);
            return fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Browser session setup failed: {e}"),
            );
        }
    };

    match state.monitor.start(&config, session).await {
        Ok(()) => ok("Chat monitoring started."),
        Err(e) => fail(StatusCode::BAD_REQUEST, format!("Cannot start: {e}.")),
    }
}

async fn stop(State(state): State<AppState>) -> Reply {
    match state.monitor.stop().await {
        Ok(()) => ok("Chat monitoring shutdown initiated."),
        Err(_) => fail(StatusCode::BAD_REQUEST, "Monitor is not running."),
    }
}

async fn status(State(state): State<AppState>) -> Reply {
    let snapshot = state.monitor.status().await;
    let label = match snapshot.state {
        MonitorState::Idle => "stopped",
        MonitorState::Running => "running",
        MonitorState::Stopping => "stopping",
    };
    (
        StatusCode::OK,
        Json(ControlResponse {
            status: label.to_string(),
            message: None,
            monitor: Some(snapshot),
        }),
    )
}

// ── Server ─────────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", any(start))
        .route("/stop", any(stop))
        .route("/status", any(status))
        .with_state(state)
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))
}

pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .context("Listener has no local address")?;
    info!("Control server listening on http://{}", addr);
    info!("Navigate to http://{}/start to begin monitoring", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

// ── Tests ──────────────────────────────────────────────────────────────────────
