//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use sqlx::mysql::MySqlPool;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use url::Url;

use crate::db::query_json;
use crate::health::HealthChecker;
use crate::metrics;

/// Version string served at `/version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed query behind `/organizers`.
pub const ORGANIZERS_QUERY: &str = "SELECT * FROM organizer";

/// Receives reasons the process must stop, sent by request handlers.
pub type FatalReceiver = mpsc::UnboundedReceiver<String>;

/// Application state shared with handlers on both listeners.
#[derive(Clone)]
pub struct AppState {
    /// Set once the connection gate and migrations have completed.
    pub ready: Arc<AtomicBool>,
    /// Database pool for query routes.
    pub pool: MySqlPool,
    /// Health probe.
    pub health: Arc<HealthChecker>,
    /// Client for the upstream schedule document.
    pub http: reqwest::Client,
    /// Upstream schedule document.
    pub sessions_url: Url,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    fatal: mpsc::UnboundedSender<String>,
}

impl AppState {
    /// Create new app state and the receiver for fatal request errors.
    pub fn new(
        pool: MySqlPool,
        health: HealthChecker,
        sessions_url: Url,
        metrics: Option<PrometheusHandle>,
    ) -> (Self, FatalReceiver) {
        let (fatal, fatal_rx) = mpsc::unbounded_channel();
        let state = Self {
            ready: Arc::new(AtomicBool::new(false)),
            pool,
            health: Arc::new(health),
            http: reqwest::Client::new(),
            sessions_url,
            metrics,
            fatal,
        };
        (state, fatal_rx)
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Ask the orchestrator to stop the process.
    fn halt(&self, reason: String) {
        if self.fatal.send(reason).is_err() {
            warn!("Fatal error receiver dropped");
        }
    }
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn json_body(body: impl Into<axum::body::Body>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body.into()).into_response()
}

/// Version handler - the version as a quoted JSON string.
pub async fn version() -> impl IntoResponse {
    let start = Instant::now();
    let response = Json(VERSION);
    metrics::record_http_latency(start, "/version");
    response
}

/// Organizers handler - every row of the organizer table.
///
/// Answers 503 until startup has completed.
pub async fn organizers(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let response = if !state.is_ready() {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "database not ready")
    } else {
        match query_json(&state.pool, ORGANIZERS_QUERY).await {
            Ok(body) => json_body(body),
            Err(e) => {
                error!(error = %e, "Failed to load organizers");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    };
    metrics::record_http_latency(start, "/organizers");
    response
}

/// Sessions handler - the upstream schedule document, unchanged.
///
/// A failed fetch halts the process rather than serving a bad document.
pub async fn sessions(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let timer = metrics::timer_upstream_fetch();

    let fetched: Result<axum::body::Bytes, reqwest::Error> = async {
        state
            .http
            .get(state.sessions_url.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
    }
    .await;

    let response = match fetched {
        Ok(body) => {
            debug!(bytes = body.len(), latency_ms = timer.elapsed_ms(), "Fetched schedule");
            json_body(body)
        }
        Err(e) => {
            error!(url = %state.sessions_url, error = %e, "Could not fetch schedule");
            metrics::inc_upstream_fetch_failures();
            state.halt(format!("could not fetch {}: {}", state.sessions_url, e));
            error_response(StatusCode::BAD_GATEWAY, "upstream schedule unavailable")
        }
    };
    drop(timer);
    metrics::record_http_latency(start, "/sessions");
    response
}

/// Health handler - 200 when the database answers, 503 otherwise.
pub async fn healthz(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let report = state.health.check(state.is_ready()).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    metrics::record_http_latency(start, "/healthz");
    (status, Json(report)).into_response()
}

/// Metrics handler - Prometheus text exposition.
pub async fn prometheus(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metrics recorder not installed"),
    }
}
