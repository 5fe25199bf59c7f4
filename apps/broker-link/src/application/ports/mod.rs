//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement, following the
//! Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `AuthProbe`: cheap authenticated call used to check a session
//! - `StreamConnector`: opens a streaming session
//! - `StreamTransport`: commands for an open streaming session

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::errors::{BrokerError, TransportError};
use crate::domain::session::SessionCredential;
use crate::domain::streaming::{InstrumentToken, Tick};

/// Cheap authenticated call whose outcome says whether a session is usable.
#[async_trait]
pub trait AuthProbe: Send + Sync {
    /// Perform the probe.
    async fn probe_auth(&self, credential: &SessionCredential) -> Result<(), BrokerError>;
}

/// Event emitted by an open transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A batch of ticks from one frame.
    Ticks(Vec<Tick>),
    /// The peer closed the session.
    Closed {
        /// Close code, if one was sent.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// The session failed.
    Error {
        /// Failure description.
        reason: String,
    },
}

/// Sender half handed to a connector for one session.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Commands on an open streaming session.
///
/// Implementations queue the command and return immediately so callers can
/// issue them while holding a lock.
pub trait StreamTransport: Send + Sync {
    /// Start streaming the given instruments.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` if the session is gone.
    fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError>;

    /// Stop streaming the given instruments.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` if the session is gone.
    fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError>;

    /// Close the session. Idempotent.
    fn close(&self);
}

/// Opens streaming sessions.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a session. Returning `Ok` means the session is connected; from
    /// then on every event for it is delivered through `events`.
    async fn open(
        &self,
        credential: &SessionCredential,
        events: TransportEventSender,
    ) -> Result<Arc<dyn StreamTransport>, TransportError>;
}
