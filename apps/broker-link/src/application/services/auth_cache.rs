//! Auth Cache
//!
//! Answers "is the broker session usable?" without calling the broker on
//! every request. A verdict is reused for `ttl`; after that one caller
//! probes while the rest wait and reuse its answer.
//!
//! A transient probe failure says nothing about the credential, so the
//! previous verdict is kept. A permanent failure marks the session invalid.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::application::ports::AuthProbe;
use crate::application::services::retry::RetryExecutor;
use crate::domain::errors::BrokerError;
use crate::domain::resilience::{Classify, FailureKind};
use crate::domain::session::SessionCredential;
use crate::infrastructure::metrics::{self, ProbeOutcome};

/// Default lifetime of a verdict.
pub const DEFAULT_AUTH_TTL: Duration = Duration::from_secs(60);

/// Cached auth verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthState {
    /// Last known verdict.
    pub is_valid: bool,
    /// When the verdict was established; `None` means never checked.
    pub checked_at: Option<Instant>,
    /// How long a verdict stays fresh.
    pub ttl: Duration,
}

impl AuthState {
    const fn unchecked(ttl: Duration) -> Self {
        Self {
            is_valid: false,
            checked_at: None,
            ttl,
        }
    }

    /// Whether the verdict can be reused at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.checked_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.ttl)
    }
}

#[derive(Debug)]
struct Entry {
    state: AuthState,
    /// Bumped after every probe so queued callers can tell one finished.
    probes: u64,
    /// Bumped whenever the credential changes.
    session: u64,
}

/// Time-boxed cache around an [`AuthProbe`].
pub struct AuthCache {
    probe: Arc<dyn AuthProbe>,
    retry: RetryExecutor,
    session: RwLock<Option<SessionCredential>>,
    entry: Mutex<Entry>,
    probe_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for AuthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.snapshot();
        let session = self.credential();
        f.debug_struct("AuthCache")
            .field("session", &session)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl AuthCache {
    /// Create a cache with no session.
    #[must_use]
    pub fn new(probe: Arc<dyn AuthProbe>, retry: RetryExecutor, ttl: Duration) -> Self {
        Self {
            probe,
            retry,
            session: RwLock::new(None),
            entry: Mutex::new(Entry {
                state: AuthState::unchecked(ttl),
                probes: 0,
                session: 0,
            }),
            probe_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Install a session. Any previous verdict is discarded.
    pub fn set_session(&self, credential: SessionCredential) {
        self.replace_session(Some(credential));
        tracing::info!("Broker session installed");
    }

    /// Drop the session. `is_valid` answers `false` until a new one is set.
    pub fn clear_session(&self) {
        self.replace_session(None);
        tracing::info!("Broker session cleared");
    }

    /// The current session, if any.
    #[must_use]
    pub fn credential(&self) -> Option<SessionCredential> {
        self.session.read().clone()
    }

    /// The cached verdict, without probing.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.entry.lock().state
    }

    /// Record that a live call was rejected for authentication.
    pub fn mark_invalid(&self) {
        let mut entry = self.entry.lock();
        entry.state.is_valid = false;
        entry.state.checked_at = Some(Instant::now());
        tracing::warn!("Broker session marked invalid");
    }

    /// Whether the session is usable, probing only when the verdict is stale.
    ///
    /// A probe that was overtaken by `set_session` or `clear_session` is
    /// discarded, and the current session is judged instead.
    pub async fn is_valid(&self) -> bool {
        loop {
            let (credential, session, observed) = {
                let entry = self.entry.lock();
                let Some(credential) = self.session.read().clone() else {
                    tracing::debug!("No broker session; auth check fails without probing");
                    return false;
                };
                if entry.state.is_fresh(Instant::now()) {
                    metrics::record_auth_cache_hit();
                    return entry.state.is_valid;
                }
                (credential, entry.session, entry.probes)
            };

            let _gate = self.probe_gate.lock().await;

            let queued = {
                let entry = self.entry.lock();
                if entry.session != session {
                    None
                } else if entry.probes != observed || entry.state.is_fresh(Instant::now()) {
                    metrics::record_auth_cache_hit();
                    Some(Some(entry.state.is_valid))
                } else {
                    Some(None)
                }
            };
            match queued {
                None => continue,
                Some(Some(verdict)) => return verdict,
                Some(None) => {}
            }

            let outcome = self
                .retry
                .execute("auth_probe", || self.probe.probe_auth(&credential))
                .await;

            if let Some(verdict) = self.record(session, outcome) {
                return verdict;
            }
            tracing::debug!("Session replaced during auth probe; discarding result");
        }
    }

    /// Apply a probe outcome for `session`. `None` if the session has been
    /// replaced since the probe started.
    fn record(&self, session: u64, outcome: Result<(), BrokerError>) -> Option<bool> {
        let mut entry = self.entry.lock();
        if entry.session != session {
            return None;
        }
        entry.probes += 1;
        match outcome {
            Ok(()) => {
                entry.state.is_valid = true;
                entry.state.checked_at = Some(Instant::now());
                metrics::record_auth_probe(ProbeOutcome::Valid);
                tracing::debug!("Auth probe succeeded");
            }
            Err(err) if err.failure_kind() == FailureKind::Transient => {
                metrics::record_auth_probe(ProbeOutcome::Inconclusive);
                tracing::warn!(
                    error = %err,
                    cached = entry.state.is_valid,
                    "Auth probe failed transiently; keeping cached verdict"
                );
            }
            Err(err) => {
                entry.state.is_valid = false;
                entry.state.checked_at = Some(Instant::now());
                metrics::record_auth_probe(ProbeOutcome::Rejected);
                tracing::warn!(error = %err, "Auth probe rejected session");
            }
        }
        Some(entry.state.is_valid)
    }

    /// The session, provided it is valid.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Authentication` if there is no session or the
    /// session is not valid.
    pub async fn require_valid(&self) -> Result<SessionCredential, BrokerError> {
        let Some(credential) = self.credential() else {
            return Err(BrokerError::authentication("no broker session"));
        };
        if self.is_valid().await {
            Ok(credential)
        } else {
            Err(BrokerError::authentication("broker session is not valid"))
        }
    }

    /// Swap the credential and its verdict together, so a reader holding
    /// the entry lock sees a matching pair.
    fn replace_session(&self, credential: Option<SessionCredential>) {
        let mut entry = self.entry.lock();
        *self.session.write() = credential;
        entry.state = AuthState::unchecked(entry.state.ttl);
        entry.session += 1;
        entry.probes += 1;
    }
}
