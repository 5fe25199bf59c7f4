//! Tick liveness tracking.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Health verdict for a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamHealth {
    /// Connected and ticks are flowing (or nothing is subscribed).
    Healthy,
    /// Connected but quiet past the degraded threshold.
    Degraded,
    /// Connected but quiet past the dead threshold.
    Stale,
    /// Not connected.
    Down,
}

impl StreamHealth {
    /// Whether the session can be relied on.
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    /// Label used in logs and the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Stale => "stale",
            Self::Down => "down",
        }
    }
}

/// When the session last showed signs of life.
///
/// Silence is measured from the later of the last tick and the last
/// (re)connect, so a fresh session is not judged by the previous one.
#[derive(Debug, Clone)]
pub struct TickHealth {
    connected_at: Option<Instant>,
    last_tick_at: Option<Instant>,
    degraded_after: Duration,
    dead_after: Duration,
}

impl TickHealth {
    /// Create tracking with the given thresholds.
    #[must_use]
    pub const fn new(degraded_after: Duration, dead_after: Duration) -> Self {
        Self {
            connected_at: None,
            last_tick_at: None,
            degraded_after,
            dead_after,
        }
    }

    /// A session was (re)established.
    pub const fn record_connected(&mut self, now: Instant) {
        self.connected_at = Some(now);
    }

    /// A tick arrived.
    pub const fn record_tick(&mut self, now: Instant) {
        self.last_tick_at = Some(now);
    }

    /// Time of the most recent tick, if any.
    #[must_use]
    pub const fn last_tick_at(&self) -> Option<Instant> {
        self.last_tick_at
    }

    /// Time the current session was established, if any.
    #[must_use]
    pub const fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    /// Quiet time as of `now`.
    #[must_use]
    pub fn silence(&self, now: Instant) -> Option<Duration> {
        let since = match (self.last_tick_at, self.connected_at) {
            (Some(tick), Some(connected)) => tick.max(connected),
            (Some(at), None) | (None, Some(at)) => at,
            (None, None) => return None,
        };
        Some(now.saturating_duration_since(since))
    }

    /// Judge a connected session. Nothing subscribed means nothing to wait for.
    #[must_use]
    pub fn assess(&self, now: Instant, has_subscriptions: bool) -> StreamHealth {
        if !has_subscriptions {
            return StreamHealth::Healthy;
        }
        match self.silence(now) {
            Some(quiet) if quiet > self.dead_after => StreamHealth::Stale,
            Some(quiet) if quiet > self.degraded_after => StreamHealth::Degraded,
            _ => StreamHealth::Healthy,
        }
    }

    /// Threshold past which the stream counts as degraded.
    #[must_use]
    pub const fn degraded_after(&self) -> Duration {
        self.degraded_after
    }

    /// Threshold past which the stream counts as dead.
    #[must_use]
    pub const fn dead_after(&self) -> Duration {
        self.dead_after
    }
}
