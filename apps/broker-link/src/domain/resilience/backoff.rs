//! Exponential Backoff
//!
//! Deterministic delay schedule shared by remote-call retries and stream
//! reconnection: `min(base * 2^attempt, cap)` with a zero-based attempt.
//!
//! # Example
//!
//! ```rust
//! use broker_link::domain::resilience::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(10));
//!
//! assert_eq!(policy.delay(0), Duration::from_secs(1));
//! assert_eq!(policy.delay(3), Duration::from_secs(8));
//! assert_eq!(policy.delay(4), Duration::from_secs(10));
//! ```

use std::time::Duration;

/// Compute the delay before retry number `attempt` (zero-based).
///
/// Overflow saturates to `cap`, so arbitrarily large attempt numbers are safe.
#[must_use]
pub fn delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    2_u32
        .checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(cap, |scaled| scaled.min(cap))
}

/// A base/cap pair bound together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay for the given zero-based attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        delay(attempt, self.base, self.cap)
    }

    /// Delay for the first attempt.
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound on any delay.
    #[must_use]
    pub const fn cap(&self) -> Duration {
        self.cap
    }
}
