//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, stream status reporting, and Prometheus
//! metrics. Reads cached state only; a request never triggers a broker call.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (stream connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{AuthCache, StreamConnection};
use crate::domain::streaming::{ConnectionState, StreamHealth};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Daemon version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Tick stream status.
    pub stream: StreamInfo,
    /// Broker session status.
    pub auth: AuthInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Stream live and session valid.
    Healthy,
    /// Usable, but quiet, recovering, or the session is unverified.
    Degraded,
    /// Stream down or stale.
    Unhealthy,
}

/// Tick stream status.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Liveness verdict.
    pub health: StreamHealth,
    /// Instruments in the subscription set.
    pub subscriptions: usize,
    /// Seconds since the last tick or connect, while connected.
    pub silence_secs: Option<u64>,
    /// Seconds since the last tick, if any arrived.
    pub last_tick_age_secs: Option<u64>,
    /// Consecutive failed reconnects.
    pub reconnect_attempts: u32,
}

/// Broker session status.
#[derive(Debug, Clone, Serialize)]
pub struct AuthInfo {
    /// Whether a credential is installed.
    pub has_session: bool,
    /// Last cached verdict.
    pub valid: bool,
    /// Whether the verdict is still within its TTL.
    pub fresh: bool,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    stream: StreamConnection,
    auth: Arc<AuthCache>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, stream: StreamConnection, auth: Arc<AuthCache>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            stream,
            auth,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Build the health router. Exposed for in-process testing.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.stream.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let report = state.stream.health_report();
    let snapshot = state.auth.snapshot();

    let stream = StreamInfo {
        state: report.state,
        health: report.status,
        subscriptions: report.subscriptions,
        silence_secs: report.silence.map(|s| s.as_secs()),
        last_tick_age_secs: state.stream.last_tick_age().map(|a| a.as_secs()),
        reconnect_attempts: report.reconnect_attempts,
    };
    let auth = AuthInfo {
        has_session: state.auth.credential().is_some(),
        valid: snapshot.is_valid,
        fresh: snapshot.is_fresh(tokio::time::Instant::now()),
    };

    HealthResponse {
        status: determine_health_status(stream.health, auth.valid),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        stream,
        auth,
    }
}

const fn determine_health_status(stream: StreamHealth, auth_valid: bool) -> HealthStatus {
    match stream {
        StreamHealth::Down | StreamHealth::Stale => HealthStatus::Unhealthy,
        StreamHealth::Degraded => HealthStatus::Degraded,
        StreamHealth::Healthy if auth_valid => HealthStatus::Healthy,
        StreamHealth::Healthy => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn live_stream_with_valid_session_is_healthy() {
        assert_eq!(
            determine_health_status(StreamHealth::Healthy, true),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn unverified_session_degrades() {
        assert_eq!(
            determine_health_status(StreamHealth::Healthy, false),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(StreamHealth::Degraded, true),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn down_or_stale_is_unhealthy() {
        assert_eq!(
            determine_health_status(StreamHealth::Down, true),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            determine_health_status(StreamHealth::Stale, true),
            HealthStatus::Unhealthy
        );
    }
}
