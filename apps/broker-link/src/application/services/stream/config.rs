//! Stream connection settings.

use std::time::Duration;

use crate::domain::errors::ConfigurationError;
use crate::domain::resilience::BackoffPolicy;

/// What to do when a connected stream goes silent past the dead threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Log and report unhealthy; leave the session alone.
    #[default]
    WarnOnly,
    /// Treat the silence as a dropped session and reconnect.
    Reconnect,
}

impl StalePolicy {
    /// Parse a policy name, defaulting to `WarnOnly`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "reconnect" => Self::Reconnect,
            _ => Self::WarnOnly,
        }
    }

    /// Policy name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WarnOnly => "warn",
            Self::Reconnect => "reconnect",
        }
    }
}

/// Reconnection and liveness settings for a [`super::StreamConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// First reconnect delay.
    pub reconnect_base_delay: Duration,
    /// Upper bound on any reconnect delay.
    pub reconnect_cap_delay: Duration,
    /// Failed reconnects before a cooldown.
    pub max_reconnect_attempts: u32,
    /// Pause after the reconnect budget is spent.
    pub reconnect_cooldown: Duration,
    /// Limit on a single transport open.
    pub connect_timeout: Duration,
    /// Silence after which a resubscribe is attempted.
    pub degraded_after: Duration,
    /// Silence after which the stream is reported stale.
    pub dead_after: Duration,
    /// Reaction to a stale stream.
    pub stale_policy: StalePolicy,
    /// Period of the background health monitor.
    pub health_check_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay: Duration::from_secs(2),
            reconnect_cap_delay: Duration::from_secs(60),
            max_reconnect_attempts: 20,
            reconnect_cooldown: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            degraded_after: Duration::from_secs(180),
            dead_after: Duration::from_secs(300),
            stale_policy: StalePolicy::WarnOnly,
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl StreamConfig {
    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` on a zero attempt budget, a cap below the
    /// base delay, a zero timeout or interval, or thresholds out of order.
    pub const fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigurationError::ZeroAttempts {
                name: "max_reconnect_attempts",
            });
        }
        if self.reconnect_cap_delay.as_nanos() < self.reconnect_base_delay.as_nanos() {
            return Err(ConfigurationError::CapBelowBase {
                name: "reconnect delay",
                base: self.reconnect_base_delay,
                cap: self.reconnect_cap_delay,
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigurationError::ZeroDuration {
                name: "connect_timeout",
            });
        }
        if self.health_check_interval.is_zero() {
            return Err(ConfigurationError::ZeroDuration {
                name: "health_check_interval",
            });
        }
        if self.degraded_after.as_nanos() > self.dead_after.as_nanos() {
            return Err(ConfigurationError::ThresholdOrder {
                degraded: self.degraded_after,
                dead: self.dead_after,
            });
        }
        Ok(())
    }

    /// Reconnect backoff schedule.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.reconnect_base_delay, self.reconnect_cap_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_reconnect_attempts, 20);
        assert_eq!(config.reconnect_cooldown, Duration::from_secs(300));
        assert_eq!(config.degraded_after, Duration::from_secs(180));
        assert_eq!(config.dead_after, Duration::from_secs(300));
        assert_eq!(config.stale_policy, StalePolicy::WarnOnly);
    }

    #[test]
    fn rejects_zero_attempts() {
        let config = StreamConfig {
            max_reconnect_attempts: 0,
            ..StreamConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ZeroAttempts { .. })
        ));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let config = StreamConfig {
            degraded_after: Duration::from_secs(400),
            ..StreamConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn rejects_cap_below_base() {
        let config = StreamConfig {
            reconnect_base_delay: Duration::from_secs(10),
            reconnect_cap_delay: Duration::from_secs(1),
            ..StreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn stale_policy_parsing() {
        assert_eq!(
            StalePolicy::from_str_case_insensitive("RECONNECT"),
            StalePolicy::Reconnect
        );
        assert_eq!(
            StalePolicy::from_str_case_insensitive("warn"),
            StalePolicy::WarnOnly
        );
        assert_eq!(
            StalePolicy::from_str_case_insensitive(""),
            StalePolicy::WarnOnly
        );
    }
}
