//! Error Taxonomy
//!
//! Errors raised by broker calls, stream transports and configuration.
//! Each carries enough structure for [`Classify`] to decide whether a retry
//! could help; anything unstructured falls back to the message vocabulary.

use std::time::Duration;

use crate::domain::resilience::{Classify, FailureKind, classify_message, classify_status};

// =============================================================================
// Broker Errors
// =============================================================================

/// Failure of a REST call against the broker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Could not reach the broker.
    #[error("network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The call did not complete in time.
    #[error("request timed out: {message}")]
    Timeout {
        /// Error details.
        message: String,
    },

    /// The broker throttled the call.
    #[error("rate limited by broker: {message}")]
    RateLimited {
        /// Error details.
        message: String,
    },

    /// The broker failed on its side (5xx).
    #[error("broker server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error details.
        message: String,
    },

    /// Credentials are missing, expired or rejected.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Error details.
        message: String,
    },

    /// The broker rejected the request (validation, not found, ...).
    #[error("broker rejected request ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error details.
        message: String,
    },

    /// Anything else; classified by its message.
    #[error("unexpected broker error: {message}")]
    Unexpected {
        /// Error details.
        message: String,
    },
}

impl BrokerError {
    /// Shorthand for an authentication failure.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Whether this is an authentication failure.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

impl Classify for BrokerError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::RateLimited { .. }
            | Self::Server { .. } => FailureKind::Transient,
            Self::Authentication { .. } | Self::Api { .. } => FailureKind::Permanent,
            Self::Unexpected { message } => classify_message(message),
        }
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Failure of the streaming transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Opening the connection took too long.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The server refused the handshake with an HTTP status.
    #[error("handshake rejected with HTTP {0}")]
    Rejected(u16),

    /// The transport has already been closed.
    #[error("transport closed")]
    Closed,

    /// The peer sent something we could not understand.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Classify for TransportError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Connect(message) => classify_message(message),
            Self::Timeout(_) | Self::Closed => FailureKind::Transient,
            Self::Rejected(status) => classify_status(*status),
            Self::Protocol(_) => FailureKind::Permanent,
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid retry, backoff or threshold parameters. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// An attempt budget was zero.
    #[error("{name} must be at least 1")]
    ZeroAttempts {
        /// Parameter name.
        name: &'static str,
    },

    /// A backoff cap was below its base delay.
    #[error("{name}: cap {cap:?} is below base {base:?}")]
    CapBelowBase {
        /// Parameter name.
        name: &'static str,
        /// Base delay.
        base: Duration,
        /// Cap delay.
        cap: Duration,
    },

    /// A duration that must be positive was zero.
    #[error("{name} must be greater than zero")]
    ZeroDuration {
        /// Parameter name.
        name: &'static str,
    },

    /// Staleness thresholds are out of order.
    #[error("degraded threshold {degraded:?} exceeds dead threshold {dead:?}")]
    ThresholdOrder {
        /// Degraded threshold.
        degraded: Duration,
        /// Dead threshold.
        dead: Duration,
    },
}

// =============================================================================
// Dynamic errors
// =============================================================================

impl Classify for anyhow::Error {
    fn failure_kind(&self) -> FailureKind {
        if let Some(err) = self.downcast_ref::<BrokerError>() {
            return err.failure_kind();
        }
        if let Some(err) = self.downcast_ref::<TransportError>() {
            return err.failure_kind();
        }
        if let Some(err) = self.downcast_ref::<std::io::Error>() {
            return err.failure_kind();
        }
        classify_message(&format!("{self:#}"))
    }
}
