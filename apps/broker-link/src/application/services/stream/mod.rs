//! Stream Connection
//!
//! Owns the single live tick session and keeps it alive.
//!
//! # State Machine
//!
//! ```text
//!                connect()            transport open
//! Disconnected ───────────► Connecting ──────────────► Connected
//!      ▲                        │                        │   ▲
//!      │        open failed     │        close / error   │   │ reopened
//!      ├────────────────────────┘                        ▼   │
//!      │                                            Reconnecting
//!      └──────────────── disconnect() ─────────────────────┘
//! ```
//!
//! Entering `Connected` replays the whole subscription set in one
//! subscribe call. Losing the session starts exactly one reconnect task,
//! which backs off exponentially, cools down after a run of failures and
//! never gives up. Every session carries a generation number; events from a
//! superseded transport are dropped.

mod callbacks;
mod config;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub use callbacks::{CloseHandler, ConnectHandler, ErrorHandler, StreamCallbacks, TickHandler};
pub use config::{StalePolicy, StreamConfig};

use crate::application::ports::{StreamConnector, StreamTransport, TransportEvent};
use crate::application::services::auth_cache::AuthCache;
use crate::domain::errors::{ConfigurationError, TransportError};
use crate::domain::resilience::{Classify, FailureKind};
use crate::domain::session::SessionCredential;
use crate::domain::streaming::{ConnectionState, InstrumentToken, StreamHealth, Tick, TickHealth};
use crate::domain::subscription::SubscriptionSet;
use crate::infrastructure::metrics;

// =============================================================================
// Errors and Reports
// =============================================================================

/// Stream operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// No session, or the session failed its auth check.
    #[error("stream requires a valid broker session")]
    NotAuthenticated,

    /// Another connect or a reconnect owns the session.
    #[error("stream is already {0}")]
    InProgress(ConnectionState),

    /// The transport could not be opened.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `disconnect` was called while the connect was in flight.
    #[error("connect cancelled by disconnect")]
    Cancelled,
}

impl Classify for StreamError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transport(err) => err.failure_kind(),
            Self::NotAuthenticated | Self::InProgress(_) | Self::Cancelled => {
                FailureKind::Permanent
            }
        }
    }
}

/// Point-in-time view of stream health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    /// Connection state.
    pub state: ConnectionState,
    /// Health verdict.
    pub status: StreamHealth,
    /// Quiet time since the last tick or connect.
    pub silence: Option<Duration>,
    /// Instruments in the subscription set.
    pub subscriptions: usize,
    /// Consecutive failed reconnects.
    pub reconnect_attempts: u32,
}

/// What `recover_if_stale` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Stream is fine or not connected.
    None,
    /// Re-sent the subscription set on the live session.
    Resubscribed,
    /// Dropped the silent session and started reconnecting.
    Reconnecting,
}

/// Why a session went away.
#[derive(Debug, Clone)]
enum DownCause {
    Closed { code: Option<u16>, reason: String },
    Error(String),
    Stale(Duration),
}

impl fmt::Display for DownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed {
                code: Some(code),
                reason,
            } => write!(f, "closed ({code}): {reason}"),
            Self::Closed { code: None, reason } => write!(f, "closed: {reason}"),
            Self::Error(reason) => write!(f, "error: {reason}"),
            Self::Stale(silence) => write!(f, "no ticks for {}s", silence.as_secs()),
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

type OpenedSession = (
    Arc<dyn StreamTransport>,
    mpsc::UnboundedReceiver<TransportEvent>,
);

struct Inner {
    state: ConnectionState,
    subscriptions: SubscriptionSet,
    health: TickHealth,
    reconnect_attempts: u32,
    transport: Option<Arc<dyn StreamTransport>>,
    /// Generation of the current (or pending) session.
    session: u64,
    /// Cancelled by `disconnect`; replaced afterwards.
    shutdown: CancellationToken,
    down_since: Option<Instant>,
}

struct Shared {
    config: StreamConfig,
    auth: Arc<AuthCache>,
    connector: Arc<dyn StreamConnector>,
    inner: Mutex<Inner>,
    callbacks: RwLock<StreamCallbacks>,
}

/// The persistent streaming session.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct StreamConnection {
    shared: Arc<Shared>,
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("StreamConnection")
            .field("state", &inner.state)
            .field("subscriptions", &inner.subscriptions.len())
            .field("reconnect_attempts", &inner.reconnect_attempts)
            .field("session", &inner.session)
            .finish_non_exhaustive()
    }
}

impl StreamConnection {
    /// Create a disconnected stream.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `config` is invalid.
    pub fn new(
        config: StreamConfig,
        auth: Arc<AuthCache>,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let inner = Inner {
            state: ConnectionState::Disconnected,
            subscriptions: SubscriptionSet::new(),
            health: TickHealth::new(config.degraded_after, config.dead_after),
            reconnect_attempts: 0,
            transport: None,
            session: 0,
            shutdown: CancellationToken::new(),
            down_since: None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                auth,
                connector,
                inner: Mutex::new(inner),
                callbacks: RwLock::new(StreamCallbacks::default()),
            }),
        })
    }

    /// Replace the consumer hooks.
    pub fn set_callbacks(&self, callbacks: StreamCallbacks) {
        *self.shared.callbacks.write() = callbacks;
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// Open the session.
    ///
    /// Succeeds immediately if already connected. A failed open returns to
    /// `Disconnected` and does not retry; reconnection only follows the loss
    /// of an established session.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` if there is no valid session (state unchanged)
    /// - `InProgress` if a connect or reconnect is already running
    /// - `Transport` if the transport could not be opened
    /// - `Cancelled` if `disconnect` raced the connect
    pub async fn connect(&self) -> Result<(), StreamError> {
        match self.state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Connected => return Ok(()),
            busy => return Err(StreamError::InProgress(busy)),
        }

        let credential = self.shared.authorized_credential().await?;

        let (session, shutdown) = {
            let mut inner = self.shared.inner.lock();
            if inner.state != ConnectionState::Disconnected {
                return Err(StreamError::InProgress(inner.state));
            }
            inner.session += 1;
            transition(&mut inner, ConnectionState::Connecting);
            (inner.session, inner.shutdown.clone())
        };

        match self.shared.open(&credential, &shutdown).await {
            Ok(Some((transport, events))) => {
                if self
                    .shared
                    .establish(session, ConnectionState::Connecting, transport, events)
                {
                    Ok(())
                } else {
                    Err(StreamError::Cancelled)
                }
            }
            Ok(None) => Err(StreamError::Cancelled),
            Err(err) => {
                let mut inner = self.shared.inner.lock();
                if inner.session == session && inner.state == ConnectionState::Connecting {
                    transition(&mut inner, ConnectionState::Disconnected);
                }
                drop(inner);
                tracing::warn!(error = %err, failure_kind = %err.failure_kind(), "Stream connect failed");
                Err(err.into())
            }
        }
    }

    /// Close the session and stop any reconnection. The subscription set is
    /// kept for the next `connect`.
    pub fn disconnect(&self) {
        let transport = {
            let mut inner = self.shared.inner.lock();
            inner.shutdown.cancel();
            inner.shutdown = CancellationToken::new();
            inner.session += 1;
            inner.reconnect_attempts = 0;
            inner.down_since = None;
            transition(&mut inner, ConnectionState::Disconnected);
            inner.transport.take()
        };

        if let Some(transport) = transport {
            transport.close();
        }
        tracing::info!("Stream disconnected");
    }

    /// Add instruments. Only newly added ones are sent, and only while
    /// connected; the rest is replayed on the next session.
    ///
    /// Returns how many instruments were new.
    pub fn subscribe(&self, tokens: &[InstrumentToken]) -> usize {
        let mut inner = self.shared.inner.lock();
        let added = inner.subscriptions.add(tokens);
        metrics::set_subscriptions(inner.subscriptions.len());

        if added.is_empty() {
            return 0;
        }

        if inner.state == ConnectionState::Connected
            && let Some(transport) = &inner.transport
        {
            if let Err(err) = transport.subscribe(&added) {
                tracing::warn!(error = %err, count = added.len(), "Subscribe not delivered; will replay on reconnect");
            } else {
                tracing::debug!(count = added.len(), "Subscribed instruments");
            }
        } else {
            tracing::debug!(
                count = added.len(),
                state = %inner.state,
                "Recorded subscriptions for next session"
            );
        }
        added.len()
    }

    /// Remove instruments. Only ones actually present are sent, and only
    /// while connected.
    ///
    /// Returns how many instruments were removed.
    pub fn unsubscribe(&self, tokens: &[InstrumentToken]) -> usize {
        let mut inner = self.shared.inner.lock();
        let removed = inner.subscriptions.remove(tokens);
        metrics::set_subscriptions(inner.subscriptions.len());

        if removed.is_empty() {
            return 0;
        }

        if inner.state == ConnectionState::Connected
            && let Some(transport) = &inner.transport
            && let Err(err) = transport.unsubscribe(&removed)
        {
            tracing::warn!(error = %err, count = removed.len(), "Unsubscribe not delivered");
        }
        removed.len()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Whether a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The subscription set, ascending.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<InstrumentToken> {
        self.shared.inner.lock().subscriptions.to_vec()
    }

    /// Consecutive failed reconnects in the current run.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().reconnect_attempts
    }

    /// Time since the last tick, if any arrived.
    #[must_use]
    pub fn last_tick_age(&self) -> Option<Duration> {
        self.shared
            .inner
            .lock()
            .health
            .last_tick_at()
            .map(|at| Instant::now().saturating_duration_since(at))
    }

    /// Point-in-time health, without logging or metrics.
    #[must_use]
    pub fn health_report(&self) -> HealthReport {
        let now = Instant::now();
        let inner = self.shared.inner.lock();
        let connected = inner.state == ConnectionState::Connected;
        HealthReport {
            state: inner.state,
            status: if connected {
                inner.health.assess(now, !inner.subscriptions.is_empty())
            } else {
                StreamHealth::Down
            },
            silence: if connected {
                inner.health.silence(now)
            } else {
                None
            },
            subscriptions: inner.subscriptions.len(),
            reconnect_attempts: inner.reconnect_attempts,
        }
    }

    /// Judge stream health. Logs a warning for a connected but silent
    /// stream; never changes state.
    pub fn check_health(&self) -> HealthReport {
        let report = self.health_report();

        let silence_secs = report.silence.map_or(0, |s| s.as_secs());
        match report.status {
            StreamHealth::Stale => {
                tracing::warn!(
                    silence_secs,
                    subscriptions = report.subscriptions,
                    "Stream connected but no ticks received past dead threshold"
                );
                metrics::record_stale_warning();
            }
            StreamHealth::Degraded => {
                tracing::info!(silence_secs, "Stream quiet past degraded threshold");
            }
            StreamHealth::Healthy | StreamHealth::Down => {}
        }
        report
    }

    /// `false` when not connected or stale.
    pub fn is_healthy(&self) -> bool {
        self.check_health().status.is_healthy()
    }

    /// Low-cost recovery for a quiet stream: re-send the subscription set
    /// once silence passes the degraded threshold. With
    /// [`StalePolicy::Reconnect`], silence past the dead threshold drops the
    /// session instead.
    pub fn recover_if_stale(&self) -> RecoveryAction {
        let now = Instant::now();
        let (session, silence, tokens, transport) = {
            let inner = self.shared.inner.lock();
            if inner.state != ConnectionState::Connected || inner.subscriptions.is_empty() {
                return RecoveryAction::None;
            }
            let Some(silence) = inner.health.silence(now) else {
                return RecoveryAction::None;
            };
            if silence <= self.shared.config.degraded_after {
                return RecoveryAction::None;
            }
            (
                inner.session,
                silence,
                inner.subscriptions.to_vec(),
                inner.transport.clone(),
            )
        };

        if silence > self.shared.config.dead_after
            && self.shared.config.stale_policy == StalePolicy::Reconnect
        {
            tracing::warn!(
                silence_secs = silence.as_secs(),
                "Stream silent past dead threshold; forcing reconnect"
            );
            self.shared.transport_down(session, DownCause::Stale(silence));
            return RecoveryAction::Reconnecting;
        }

        let Some(transport) = transport else {
            return RecoveryAction::None;
        };
        match transport.subscribe(&tokens) {
            Ok(()) => {
                tracing::info!(
                    silence_secs = silence.as_secs(),
                    count = tokens.len(),
                    "Re-sent subscriptions on quiet stream"
                );
                metrics::record_stale_resubscribe();
                RecoveryAction::Resubscribed
            }
            Err(err) => {
                tracing::warn!(error = %err, "Resubscribe on quiet stream failed");
                RecoveryAction::None
            }
        }
    }

    /// Run `check_health` and `recover_if_stale` every
    /// `health_check_interval` until `cancel` fires.
    pub fn spawn_health_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let connection = self.clone();
        let period = self.shared.config.health_check_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("Stream health monitor stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        let report = connection.check_health();
                        if report.status != StreamHealth::Down {
                            connection.recover_if_stale();
                        }
                    }
                }
            }
        })
    }
}

// =============================================================================
// Session plumbing
// =============================================================================

impl Shared {
    async fn authorized_credential(&self) -> Result<SessionCredential, StreamError> {
        let Some(credential) = self.auth.credential() else {
            tracing::warn!("Stream connect refused: no broker session");
            return Err(StreamError::NotAuthenticated);
        };
        if !self.auth.is_valid().await {
            tracing::warn!("Stream connect refused: broker session not valid");
            return Err(StreamError::NotAuthenticated);
        }
        Ok(credential)
    }

    /// Open a transport, giving up on timeout or shutdown (`Ok(None)`).
    async fn open(
        &self,
        credential: &SessionCredential,
        shutdown: &CancellationToken,
    ) -> Result<Option<OpenedSession>, TransportError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let limit = self.config.connect_timeout;

        tokio::select! {
            () = shutdown.cancelled() => Ok(None),
            opened = tokio::time::timeout(limit, self.connector.open(credential, events_tx)) => {
                match opened {
                    Ok(Ok(transport)) => Ok(Some((transport, events_rx))),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(TransportError::Timeout(limit)),
                }
            }
        }
    }

    /// Install a freshly opened transport if `session` is still the one
    /// being established from `expected`. Returns `false` (and closes the
    /// transport) if it was superseded.
    fn establish(
        self: &Arc<Self>,
        session: u64,
        expected: ConnectionState,
        transport: Arc<dyn StreamTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> bool {
        let (on_connect, outage) = {
            let mut inner = self.inner.lock();
            if inner.session != session || inner.state != expected {
                drop(inner);
                transport.close();
                tracing::debug!(session, "Discarding superseded transport");
                return false;
            }

            let now = Instant::now();
            inner.health.record_connected(now);
            inner.reconnect_attempts = 0;

            let tokens = inner.subscriptions.to_vec();
            if !tokens.is_empty() {
                match transport.subscribe(&tokens) {
                    Ok(()) => tracing::info!(count = tokens.len(), "Subscriptions restored"),
                    Err(err) => tracing::warn!(error = %err, "Failed to restore subscriptions"),
                }
            }

            inner.transport = Some(transport);
            transition(&mut inner, ConnectionState::Connected);
            let outage = inner
                .down_since
                .take()
                .map(|since| now.saturating_duration_since(since));
            (self.callbacks.read().on_connect.clone(), outage)
        };

        if let Some(outage) = outage {
            metrics::record_outage(outage);
        }
        tokio::spawn(Arc::clone(self).pump(session, events));

        if let Some(on_connect) = on_connect {
            guarded("on_connect", || on_connect());
        }
        true
    }

    fn is_current(&self, session: u64) -> bool {
        self.inner.lock().session == session
    }

    /// Drain one session's events in order.
    async fn pump(self: Arc<Self>, session: u64, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            if !self.is_current(session) {
                tracing::debug!(session, "Event pump for superseded session exiting");
                return;
            }
            match event {
                TransportEvent::Ticks(batch) => self.ingest(session, &batch),
                TransportEvent::Closed { code, reason } => {
                    self.transport_down(session, DownCause::Closed { code, reason });
                }
                TransportEvent::Error { reason } => {
                    self.transport_down(session, DownCause::Error(reason));
                }
            }
        }

        if self.is_current(session) {
            self.transport_down(
                session,
                DownCause::Closed {
                    code: None,
                    reason: "event stream ended".to_string(),
                },
            );
        }
    }

    fn ingest(&self, session: u64, batch: &[Tick]) {
        if batch.is_empty() {
            return;
        }

        {
            let mut inner = self.inner.lock();
            if inner.session != session || inner.state != ConnectionState::Connected {
                return;
            }
            inner.health.record_tick(Instant::now());
            if inner.reconnect_attempts != 0 {
                tracing::debug!(
                    attempts = inner.reconnect_attempts,
                    "Tick received; resetting reconnect attempts"
                );
                inner.reconnect_attempts = 0;
            }
        }
        metrics::record_ticks(batch.len());

        let Some(handler) = self.callbacks.read().on_ticks.clone() else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| handler(batch))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %err, ticks = batch.len(), "Tick consumer failed");
                metrics::record_consumer_failure();
            }
            Err(_) => {
                tracing::error!(ticks = batch.len(), "Tick consumer panicked");
                metrics::record_consumer_failure();
            }
        }
    }

    /// The session identified by `session` went away. Only the first signal
    /// for a connected session starts a reconnect task.
    fn transport_down(self: &Arc<Self>, session: u64, cause: DownCause) {
        let transport = {
            let mut inner = self.inner.lock();
            if inner.session != session {
                return;
            }
            match inner.state {
                ConnectionState::Connected => {}
                ConnectionState::Reconnecting => {
                    tracing::debug!(cause = %cause, "Reconnect already in progress; ignoring signal");
                    return;
                }
                ConnectionState::Disconnected | ConnectionState::Connecting => {
                    tracing::debug!(cause = %cause, state = %inner.state, "Ignoring transport signal");
                    return;
                }
            }

            tracing::warn!(
                cause = %cause,
                subscriptions = inner.subscriptions.len(),
                "Stream session lost"
            );
            transition(&mut inner, ConnectionState::Reconnecting);
            inner.down_since = Some(Instant::now());
            tokio::spawn(Arc::clone(self).reconnect(inner.shutdown.clone()));
            inner.transport.take()
        };

        if let Some(transport) = transport {
            transport.close();
        }

        let callbacks = self.callbacks.read().clone();
        match cause {
            DownCause::Closed { code, reason } => {
                if let Some(on_close) = callbacks.on_close {
                    guarded("on_close", || on_close(code, &reason));
                }
            }
            DownCause::Error(reason) => {
                if let Some(on_error) = callbacks.on_error {
                    guarded("on_error", || on_error(&reason));
                }
            }
            DownCause::Stale(silence) => {
                if let Some(on_error) = callbacks.on_error {
                    let reason = DownCause::Stale(silence).to_string();
                    guarded("on_error", || on_error(&reason));
                }
            }
        }
    }

    /// The single reconnection sequence. Runs until a session is
    /// re-established or `shutdown` fires.
    async fn reconnect(self: Arc<Self>, shutdown: CancellationToken) {
        let backoff = self.config.backoff();

        loop {
            let attempts = {
                let inner = self.inner.lock();
                if shutdown.is_cancelled() || inner.state != ConnectionState::Reconnecting {
                    return;
                }
                inner.reconnect_attempts
            };

            if attempts >= self.config.max_reconnect_attempts {
                tracing::warn!(
                    attempts,
                    cooldown_secs = self.config.reconnect_cooldown.as_secs(),
                    "Reconnect attempts exhausted; cooling down"
                );
                metrics::record_reconnect_cooldown();
                if !sleep_unless_cancelled(self.config.reconnect_cooldown, &shutdown).await {
                    return;
                }

                let mut inner = self.inner.lock();
                if shutdown.is_cancelled() || inner.state != ConnectionState::Reconnecting {
                    return;
                }
                inner.reconnect_attempts = 0;
                tracing::info!("Cooldown over; resuming reconnects from base delay");
                continue;
            }

            let delay = backoff.delay(attempts);
            tracing::info!(
                attempt = attempts + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting after delay"
            );
            if !sleep_unless_cancelled(delay, &shutdown).await {
                return;
            }

            metrics::record_reconnect_attempt();
            match self.try_reconnect(&shutdown).await {
                Ok(true) => {
                    tracing::info!(attempt = attempts + 1, "Stream reconnected");
                    return;
                }
                Ok(false) => return,
                Err(err) => {
                    if !self.record_failed_reconnect(&shutdown, &err) {
                        return;
                    }
                }
            }
        }
    }

    /// Count a failed attempt against the sequence owning `shutdown`.
    /// Returns `false` if that sequence has been superseded, in which case
    /// nothing is counted.
    fn record_failed_reconnect(&self, shutdown: &CancellationToken, err: &StreamError) -> bool {
        let mut inner = self.inner.lock();
        if shutdown.is_cancelled() || inner.state != ConnectionState::Reconnecting {
            tracing::debug!(error = %err, "Superseded reconnect attempt failed; not counted");
            return false;
        }
        inner.reconnect_attempts += 1;
        tracing::warn!(
            attempt = inner.reconnect_attempts,
            error = %err,
            failure_kind = %err.failure_kind(),
            "Reconnect attempt failed"
        );
        true
    }

    /// `Ok(false)` means the sequence was superseded and should stop.
    async fn try_reconnect(self: &Arc<Self>, shutdown: &CancellationToken) -> Result<bool, StreamError> {
        let credential = self.authorized_credential().await?;

        let session = {
            let mut inner = self.inner.lock();
            if shutdown.is_cancelled() || inner.state != ConnectionState::Reconnecting {
                return Ok(false);
            }
            inner.session += 1;
            inner.session
        };

        match self.open(&credential, shutdown).await? {
            Some((transport, events)) => Ok(self.establish(
                session,
                ConnectionState::Reconnecting,
                transport,
                events,
            )),
            None => Ok(false),
        }
    }
}

fn transition(inner: &mut Inner, next: ConnectionState) {
    let from = inner.state;
    if from == next {
        return;
    }
    inner.state = next;
    tracing::info!(from = %from, to = %next, session = inner.session, "Stream state changed");
    metrics::record_state_transition(from, next);
}

/// Sleep for `duration`; `false` if `shutdown` fired first.
async fn sleep_unless_cancelled(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

/// Run a consumer hook, containing any panic.
fn guarded(hook: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(hook, "Stream callback panicked");
    }
}
