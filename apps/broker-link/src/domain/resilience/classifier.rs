//! Failure Classification
//!
//! Decides whether a failed remote call is worth retrying. Transient
//! failures (timeouts, dropped connections, throttling, 5xx) are retried;
//! everything else, authentication failures in particular, is permanent.

use std::fmt;

/// Retry-worthiness of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Likely to succeed if retried later.
    Transient,
    /// Retrying will not help.
    Permanent,
}

impl FailureKind {
    /// Whether the failure should be retried.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that know whether they are worth retrying.
pub trait Classify {
    /// Classify this failure.
    fn failure_kind(&self) -> FailureKind;
}

/// Signals that mark a failure message as transient. Matched against a
/// lowercased message with `-` and `_` folded to spaces.
const TRANSIENT_SIGNALS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection aborted",
    "broken pipe",
    "network unreachable",
    "network is unreachable",
    "rate limit",
    "too many requests",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "internal server error",
    "temporarily unavailable",
];

/// Classify a failure from its textual description.
#[must_use]
pub fn classify_message(message: &str) -> FailureKind {
    let normalized: String = message
        .chars()
        .map(|c| match c {
            '-' | '_' => ' ',
            other => other.to_ascii_lowercase(),
        })
        .collect();

    if TRANSIENT_SIGNALS
        .iter()
        .any(|signal| normalized.contains(signal))
    {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

/// Classify an HTTP status code. Throttling and server-side errors are
/// transient.
#[must_use]
pub const fn classify_status(status: u16) -> FailureKind {
    match status {
        429 | 500 | 502 | 503 | 504 => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

impl Classify for std::io::Error {
    fn failure_kind(&self) -> FailureKind {
        use std::io::ErrorKind;

        match self.kind() {
            ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NetworkUnreachable => FailureKind::Transient,
            _ => classify_message(&self.to_string()),
        }
    }
}
