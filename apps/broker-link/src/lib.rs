#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Broker Link - Resilient Brokerage Connectivity
//!
//! Keeps a trading application talking to Kite Connect through network
//! faults, throttling and expired sessions: REST calls are retried with
//! capped exponential backoff, session validity is cached, and the tick
//! stream reconnects on its own and restores its subscriptions.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and policies
//!   - `resilience`: Backoff schedule, failure classification
//!   - `errors`: Broker, transport and configuration errors
//!   - `session`: Session credential
//!   - `streaming`: Ticks, connection state, liveness tracking
//!   - `subscription`: The subscription set
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Auth probe, stream connector and transport
//!   - `services`: Retry executor, auth cache, gateway, stream connection
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `kite`: REST client and ticker WebSocket
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                  ┌───────────────┐  probe   ┌────────────────┐
//! REST caller ───► │ BrokerGateway │ ───────► │   AuthCache    │
//!                  └───────┬───────┘          └───────┬────────┘
//!                          │ retry                    │
//!                          ▼                          ▼
//!                   Kite REST API ◄──────────── KiteRestClient
//!
//!  Kite ticker WS ──► KiteTickerTransport ──► StreamConnection ──► tick handler
//!                                               │  ▲
//!                                               ▼  │ reconnect + resubscribe
//!                                            reconnect task
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::errors::{BrokerError, ConfigurationError, TransportError};
pub use domain::resilience::{BackoffPolicy, Classify, FailureKind};
pub use domain::session::SessionCredential;
pub use domain::streaming::{ConnectionState, InstrumentToken, StreamHealth, Tick, TickMode};
pub use domain::subscription::SubscriptionSet;

// Ports
pub use application::ports::{
    AuthProbe, StreamConnector, StreamTransport, TransportEvent, TransportEventSender,
};

// Services
pub use application::services::{
    AuthCache, AuthState, BrokerGateway, HealthReport, RecoveryAction, RetryConfig,
    RetryExecutor, StalePolicy, StreamCallbacks, StreamConfig, StreamConnection, StreamError,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, KiteSettings, LinkConfig, ServerSettings};

// Kite adapters
pub use infrastructure::kite::{KiteRestClient, KiteTickerConnector};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
