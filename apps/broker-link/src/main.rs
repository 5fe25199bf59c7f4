//! Broker Link Binary
//!
//! Verifies the broker session, opens the tick stream, and keeps it alive
//! until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin broker-link
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KITE_API_KEY`: Kite Connect API key
//!
//! ## Optional
//! - `KITE_ACCESS_TOKEN`: Session access token (stream stays down without it)
//! - `KITE_API_URL`, `KITE_TICKER_URL`: Endpoint overrides
//! - `BROKER_LINK_INSTRUMENTS`: Comma separated instrument tokens
//! - `BROKER_LINK_TICK_MODE`: ltp | quote | full (default: quote)
//! - `BROKER_LINK_STALE_POLICY`: warn | reconnect (default: warn)
//! - `BROKER_LINK_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: broker-link)
//! - `RUST_LOG`: Log level (default: info)
//!
//! Retry, reconnect and staleness tuning variables are listed in
//! `infrastructure::config`.

use std::sync::Arc;
use std::time::Duration;

use broker_link::application::services::BrokerGateway;
use broker_link::infrastructure::health::{HealthServer, HealthServerState};
use broker_link::infrastructure::telemetry;
use broker_link::{
    AuthCache, AuthProbe, KiteRestClient, KiteTickerConnector, LinkConfig, RetryExecutor,
    StreamCallbacks, StreamConnection, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Broker Link");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = LinkConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let rest = Arc::new(KiteRestClient::new(
        config.kite.api_url.clone(),
        config.http_timeout,
    )?);
    let retry = RetryExecutor::new(config.retry)?;

    let probe: Arc<dyn AuthProbe> = rest.clone();
    let auth = Arc::new(AuthCache::new(probe, retry.clone(), config.auth_ttl));
    match config.session() {
        Some(session) => auth.set_session(session),
        None => tracing::warn!("KITE_ACCESS_TOKEN not set; stream stays down without a session"),
    }

    let gateway = BrokerGateway::new(Arc::clone(&auth), retry.clone());
    report_positions(&gateway, &rest).await;

    let connector = Arc::new(KiteTickerConnector::new(
        config.kite.ticker_url.clone(),
        config.tick_mode,
    ));
    let stream = StreamConnection::new(config.stream, Arc::clone(&auth), connector)?;
    stream.set_callbacks(
        StreamCallbacks::new()
            .on_ticks(|ticks| {
                for tick in ticks {
                    tracing::trace!(
                        instrument_token = tick.instrument_token,
                        last_price = %tick.last_price,
                        "Tick"
                    );
                }
                Ok(())
            })
            .on_connect(|| tracing::info!("Tick stream live"))
            .on_close(|code, reason| {
                tracing::warn!(?code, reason, "Tick stream closed");
            })
            .on_error(|reason| tracing::warn!(reason, "Tick stream error")),
    );

    let added = stream.subscribe(&config.instruments);
    tracing::info!(added, "Startup instruments registered");

    let monitor = stream.spawn_health_monitor(shutdown_token.clone());

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        stream.clone(),
        Arc::clone(&auth),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    match retry.execute("stream_connect", || stream.connect()).await {
        Ok(()) => tracing::info!("Broker Link ready"),
        Err(e) => tracing::error!(error = %e, "Tick stream unavailable; serving health only"),
    }

    await_shutdown(shutdown_token).await;

    stream.disconnect();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, monitor).await.is_err() {
        tracing::warn!("Health monitor did not stop in time");
    }

    tracing::info!("Broker Link stopped");
    Ok(())
}

/// Log open positions through the gateway as a startup smoke check.
async fn report_positions(gateway: &BrokerGateway, rest: &Arc<KiteRestClient>) {
    let result = gateway
        .call("positions", |credential| {
            let rest = Arc::clone(rest);
            async move { rest.positions(&credential).await }
        })
        .await;

    match result {
        Ok(positions) => tracing::info!(
            net = positions.net.len(),
            day = positions.day.len(),
            "Broker session verified"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not fetch positions at startup"),
    }
}

/// Log the parsed configuration.
fn log_config(config: &LinkConfig) {
    tracing::info!(
        api_url = %config.kite.api_url,
        ticker_url = %config.kite.ticker_url,
        tick_mode = config.tick_mode.as_str(),
        instruments = config.instruments.len(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        retry_max_attempts = config.retry.max_attempts,
        auth_ttl_secs = config.auth_ttl.as_secs(),
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        reconnect_cooldown_secs = config.stream.reconnect_cooldown.as_secs(),
        stale_policy = config.stream.stale_policy.as_str(),
        "Resilience settings"
    );
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
