//! Prometheus Metrics Module
//!
//! Exposes resilience metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Retries**: retried, exhausted and permanently failed remote calls
//! - **Auth**: probe outcomes and cache hits
//! - **Stream**: connection state, reconnects, cooldowns, outages
//! - **Ticks**: ticks received, consumer failures, staleness
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before `init_metrics` is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::resilience::FailureKind;
use crate::domain::streaming::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "broker_link_retries_total",
        "Remote call attempts that failed transiently and were retried"
    );
    describe_counter!(
        "broker_link_retries_exhausted_total",
        "Remote calls that failed after the last allowed attempt"
    );
    describe_counter!(
        "broker_link_call_failures_total",
        "Remote calls that failed permanently"
    );

    describe_counter!(
        "broker_link_auth_probes_total",
        "Auth probes by outcome"
    );
    describe_counter!(
        "broker_link_auth_cache_hits_total",
        "Auth checks answered from cache"
    );

    describe_gauge!(
        "broker_link_connection_state",
        "Stream state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting)"
    );
    describe_counter!(
        "broker_link_state_transitions_total",
        "Stream state transitions"
    );
    describe_counter!(
        "broker_link_reconnect_attempts_total",
        "Stream reconnect attempts"
    );
    describe_counter!(
        "broker_link_reconnect_cooldowns_total",
        "Times the reconnect budget was exhausted and a cooldown started"
    );
    describe_histogram!(
        "broker_link_outage_seconds",
        "Time between losing the stream and getting it back"
    );

    describe_counter!("broker_link_ticks_total", "Ticks received");
    describe_counter!(
        "broker_link_tick_consumer_failures_total",
        "Tick batches the consumer failed to process"
    );
    describe_counter!(
        "broker_link_stale_warnings_total",
        "Health checks that found a connected but silent stream"
    );
    describe_counter!(
        "broker_link_stale_resubscribes_total",
        "Resubscribe probes issued on a quiet stream"
    );
    describe_gauge!(
        "broker_link_subscriptions",
        "Instruments in the subscription set"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Auth probe outcome label.
#[derive(Debug, Clone, Copy)]
pub enum ProbeOutcome {
    /// Session confirmed valid.
    Valid,
    /// Probe failed transiently; verdict kept.
    Inconclusive,
    /// Session rejected.
    Rejected,
}

impl ProbeOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Inconclusive => "inconclusive",
            Self::Rejected => "rejected",
        }
    }
}

/// Record a retried remote call attempt.
pub fn record_retry(operation: &str) {
    counter!("broker_link_retries_total", "operation" => operation.to_owned()).increment(1);
}

/// Record a remote call that ran out of attempts.
pub fn record_retries_exhausted(operation: &str) {
    counter!("broker_link_retries_exhausted_total", "operation" => operation.to_owned())
        .increment(1);
}

/// Record a remote call that failed without being retried.
pub fn record_call_failure(operation: &str, kind: FailureKind) {
    counter!(
        "broker_link_call_failures_total",
        "operation" => operation.to_owned(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record an auth probe.
pub fn record_auth_probe(outcome: ProbeOutcome) {
    counter!("broker_link_auth_probes_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record an auth check served from cache.
pub fn record_auth_cache_hit() {
    counter!("broker_link_auth_cache_hits_total").increment(1);
}

/// Record a stream state transition.
pub fn record_state_transition(from: ConnectionState, to: ConnectionState) {
    gauge!("broker_link_connection_state").set(to.as_gauge());
    counter!(
        "broker_link_state_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Record a reconnect attempt.
pub fn record_reconnect_attempt() {
    counter!("broker_link_reconnect_attempts_total").increment(1);
}

/// Record an exhausted reconnect budget.
pub fn record_reconnect_cooldown() {
    counter!("broker_link_reconnect_cooldowns_total").increment(1);
}

/// Record how long the stream was down.
pub fn record_outage(duration: Duration) {
    histogram!("broker_link_outage_seconds").record(duration.as_secs_f64());
}

/// Record received ticks.
pub fn record_ticks(count: usize) {
    counter!("broker_link_ticks_total").increment(u64::try_from(count).unwrap_or(u64::MAX));
}

/// Record a failed tick consumer call.
pub fn record_consumer_failure() {
    counter!("broker_link_tick_consumer_failures_total").increment(1);
}

/// Record a stale-stream warning.
pub fn record_stale_warning() {
    counter!("broker_link_stale_warnings_total").increment(1);
}

/// Record a resubscribe issued by staleness recovery.
pub fn record_stale_resubscribe() {
    counter!("broker_link_stale_resubscribes_total").increment(1);
}

/// Update the subscription set size.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("broker_link_subscriptions").set(count as f64);
}
