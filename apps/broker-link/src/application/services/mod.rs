//! Application Services
//!
//! - `retry`: retry with backoff for remote calls
//! - `auth_cache`: cached session validity
//! - `gateway`: auth gate plus retry for REST calls
//! - `stream`: the self-healing tick session

pub mod auth_cache;
pub mod gateway;
pub mod retry;
pub mod stream;

pub use auth_cache::{AuthCache, AuthState, DEFAULT_AUTH_TTL};
pub use gateway::BrokerGateway;
pub use retry::{RetryAttempt, RetryConfig, RetryExecutor, RetryObserver};
pub use stream::{
    HealthReport, RecoveryAction, StalePolicy, StreamCallbacks, StreamConfig, StreamConnection,
    StreamError,
};
