//! Hand-written fakes for the broker ports.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use broker_link::{
    AuthCache, AuthProbe, BrokerError, InstrumentToken, RetryConfig, RetryExecutor,
    SessionCredential, StreamConnector, StreamTransport, TransportError, TransportEvent,
    TransportEventSender,
};

pub fn credential() -> SessionCredential {
    SessionCredential::new("test-key", "test-token").unwrap()
}

pub fn retry(max_attempts: u32) -> RetryExecutor {
    RetryExecutor::new(RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(100),
        cap_delay: Duration::from_secs(1),
    })
    .unwrap()
}

// =============================================================================
// Auth probe
// =============================================================================

/// Probe that replays scripted results, then repeats `fallback`.
pub struct FakeProbe {
    script: Mutex<VecDeque<Result<(), BrokerError>>>,
    fallback: Result<(), BrokerError>,
    latency: Duration,
    /// When set, only these access tokens are accepted.
    accepted: Option<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn valid() -> Arc<Self> {
        Arc::new(Self::with_fallback(Ok(())))
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self::with_fallback(Err(BrokerError::authentication(
            "Incorrect `api_key` or `access_token`.",
        ))))
    }

    pub fn scripted(results: Vec<Result<(), BrokerError>>) -> Arc<Self> {
        let probe = Self::with_fallback(Ok(()));
        *probe.script.lock() = results.into();
        Arc::new(probe)
    }

    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::with_fallback(Ok(()))
        })
    }

    /// Accepts only the listed access tokens, answering after `latency`.
    pub fn accepting(tokens: &[&str], latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            accepted: Some(tokens.iter().map(ToString::to_string).collect()),
            ..Self::with_fallback(Ok(()))
        })
    }

    fn with_fallback(fallback: Result<(), BrokerError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            accepted: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProbe for FakeProbe {
    async fn probe_auth(&self, credential: &SessionCredential) -> Result<(), BrokerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(accepted) = &self.accepted {
            return if accepted.iter().any(|t| t == credential.access_token()) {
                Ok(())
            } else {
                Err(BrokerError::authentication("Token is invalid or has expired."))
            };
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Auth cache with a valid session and a long-lived verdict.
pub fn valid_auth() -> (Arc<AuthCache>, Arc<FakeProbe>) {
    let probe = FakeProbe::valid();
    let auth = Arc::new(AuthCache::new(
        Arc::clone(&probe) as Arc<dyn AuthProbe>,
        retry(1),
        Duration::from_secs(3600),
    ));
    auth.set_session(credential());
    (auth, probe)
}

// =============================================================================
// Stream transport
// =============================================================================

/// A command the stream issued on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Subscribe(Vec<InstrumentToken>),
    Unsubscribe(Vec<InstrumentToken>),
    Close,
}

/// Transport that records commands and lets the test inject events.
pub struct FakeTransport {
    calls: Mutex<Vec<Call>>,
    events: Mutex<Option<TransportEventSender>>,
    wire: TransportEventSender,
}

impl FakeTransport {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn subscribe_calls(&self) -> Vec<Vec<InstrumentToken>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Subscribe(tokens) => Some(tokens.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.calls.lock().contains(&Call::Close)
    }

    /// Deliver an event as if it came off the wire. Returns `false` once
    /// the transport has been closed.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Deliver an event even after close, like a socket that keeps
    /// talking after it was abandoned.
    pub fn emit_late(&self, event: TransportEvent) {
        let _ = self.wire.send(event);
    }
}

impl StreamTransport for FakeTransport {
    fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        if self.events.lock().is_none() {
            return Err(TransportError::Closed);
        }
        self.calls.lock().push(Call::Subscribe(tokens.to_vec()));
        Ok(())
    }

    fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        if self.events.lock().is_none() {
            return Err(TransportError::Closed);
        }
        self.calls.lock().push(Call::Unsubscribe(tokens.to_vec()));
        Ok(())
    }

    fn close(&self) {
        if self.events.lock().take().is_some() {
            self.calls.lock().push(Call::Close);
        }
    }
}

// =============================================================================
// Stream connector
// =============================================================================

/// Outcome of one `open` call.
#[derive(Debug, Clone)]
pub enum Open {
    Succeed,
    Fail(TransportError),
    Hang,
}

/// Connector that follows a script and reports every open attempt.
pub struct FakeConnector {
    script: Mutex<VecDeque<Open>>,
    fallback: Open,
    transports: Mutex<Vec<Arc<FakeTransport>>>,
    opens: AtomicUsize,
    open_times: mpsc::UnboundedSender<Instant>,
}

impl FakeConnector {
    /// Always succeeds. The receiver yields the time of every open attempt.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Instant>) {
        Self::scripted(Vec::new(), Open::Succeed)
    }

    pub fn scripted(
        script: Vec<Open>,
        fallback: Open,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Instant>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            transports: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
            open_times: tx,
        });
        (connector, rx)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Transports handed out so far, oldest first.
    pub fn transports(&self) -> Vec<Arc<FakeTransport>> {
        self.transports.lock().clone()
    }

    pub fn transport(&self, index: usize) -> Arc<FakeTransport> {
        Arc::clone(&self.transports.lock()[index])
    }

    pub fn latest(&self) -> Arc<FakeTransport> {
        Arc::clone(self.transports.lock().last().expect("no transport opened"))
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn open(
        &self,
        _credential: &SessionCredential,
        events: TransportEventSender,
    ) -> Result<Arc<dyn StreamTransport>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let _ = self.open_times.send(Instant::now());

        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Open::Succeed => {
                let transport = Arc::new(FakeTransport {
                    calls: Mutex::new(Vec::new()),
                    wire: events.clone(),
                    events: Mutex::new(Some(events)),
                });
                self.transports.lock().push(Arc::clone(&transport));
                Ok(transport)
            }
            Open::Fail(err) => Err(err),
            Open::Hang => std::future::pending().await,
        }
    }
}

pub fn dyn_connector(connector: &Arc<FakeConnector>) -> Arc<dyn StreamConnector> {
    Arc::clone(connector) as Arc<dyn StreamConnector>
}

/// Poll `condition` in one millisecond steps until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
