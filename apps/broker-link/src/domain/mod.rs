//! Domain Layer - Core types and policies.
//!
//! Pure types with no I/O: the backoff schedule, failure classification,
//! error taxonomy, session credential, market data types and the
//! subscription set.

/// Error taxonomy shared by all layers.
pub mod errors;

/// Backoff schedule and failure classification.
pub mod resilience;

/// Broker session credential.
pub mod session;

/// Market data and connection state types.
pub mod streaming;

/// Subscription set replayed on every session.
pub mod subscription;
