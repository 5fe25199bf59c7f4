//! Broker Link Configuration Settings
//!
//! Configuration types for the daemon, loaded from environment variables.
//! Values that fail to parse fall back to their defaults; values that parse
//! but make no sense together are rejected.

use std::time::Duration;

use crate::application::services::{DEFAULT_AUTH_TTL, RetryConfig, StalePolicy, StreamConfig};
use crate::domain::errors::ConfigurationError;
use crate::domain::session::SessionCredential;
use crate::domain::streaming::{InstrumentToken, TickMode};
use crate::infrastructure::kite::{DEFAULT_API_URL, DEFAULT_TICKER_URL};

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Kite Connect endpoints and credentials.
#[derive(Clone)]
pub struct KiteSettings {
    /// App API key.
    pub api_key: String,
    /// Session access token. Absent until a login flow supplies one.
    pub access_token: Option<String>,
    /// REST base URL.
    pub api_url: String,
    /// Ticker WebSocket URL.
    pub ticker_url: String,
}

impl std::fmt::Debug for KiteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiteSettings")
            .field("api_key", &self.api_key)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_url", &self.api_url)
            .field("ticker_url", &self.ticker_url)
            .finish()
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Broker endpoints and credentials.
    pub kite: KiteSettings,
    /// Retry policy for REST calls and auth probes.
    pub retry: RetryConfig,
    /// Lifetime of a cached auth verdict.
    pub auth_ttl: Duration,
    /// Stream reconnection and liveness settings.
    pub stream: StreamConfig,
    /// Subscription mode for ticks.
    pub tick_mode: TickMode,
    /// Instruments subscribed at startup.
    pub instruments: Vec<InstrumentToken>,
    /// Per-request REST timeout.
    pub http_timeout: Duration,
    /// Server port settings.
    pub server: ServerSettings,
}

impl LinkConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `KITE_API_KEY` is missing or empty, or if the
    /// retry or stream settings are inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`LinkConfig::from_env`].
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let api_key =
            lookup("KITE_API_KEY").ok_or_else(|| ConfigError::MissingEnvVar("KITE_API_KEY".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue("KITE_API_KEY".to_string()));
        }

        let kite = KiteSettings {
            api_key,
            access_token: lookup("KITE_ACCESS_TOKEN").filter(|t| !t.trim().is_empty()),
            api_url: lookup("KITE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            ticker_url: lookup("KITE_TICKER_URL").unwrap_or_else(|| DEFAULT_TICKER_URL.to_string()),
        };

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: parse_env_u32(
                lookup,
                "BROKER_LINK_RETRY_MAX_ATTEMPTS",
                retry_defaults.max_attempts,
            ),
            base_delay: parse_env_duration_millis(
                lookup,
                "BROKER_LINK_RETRY_BASE_DELAY_MS",
                retry_defaults.base_delay,
            ),
            cap_delay: parse_env_duration_secs(
                lookup,
                "BROKER_LINK_RETRY_CAP_DELAY_SECS",
                retry_defaults.cap_delay,
            ),
        };
        retry.validate()?;

        let stream_defaults = StreamConfig::default();
        let stream = StreamConfig {
            reconnect_base_delay: parse_env_duration_millis(
                lookup,
                "BROKER_LINK_RECONNECT_BASE_DELAY_MS",
                stream_defaults.reconnect_base_delay,
            ),
            reconnect_cap_delay: parse_env_duration_secs(
                lookup,
                "BROKER_LINK_RECONNECT_CAP_DELAY_SECS",
                stream_defaults.reconnect_cap_delay,
            ),
            max_reconnect_attempts: parse_env_u32(
                lookup,
                "BROKER_LINK_MAX_RECONNECT_ATTEMPTS",
                stream_defaults.max_reconnect_attempts,
            ),
            reconnect_cooldown: parse_env_duration_secs(
                lookup,
                "BROKER_LINK_RECONNECT_COOLDOWN_SECS",
                stream_defaults.reconnect_cooldown,
            ),
            connect_timeout: parse_env_duration_secs(
                lookup,
                "BROKER_LINK_CONNECT_TIMEOUT_SECS",
                stream_defaults.connect_timeout,
            ),
            degraded_after: parse_env_duration_secs(
                lookup,
                "BROKER_LINK_STALE_DEGRADED_SECS",
                stream_defaults.degraded_after,
            ),
            dead_after: parse_env_duration_secs(
                lookup,
                "BROKER_LINK_STALE_DEAD_SECS",
                stream_defaults.dead_after,
            ),
            stale_policy: lookup("BROKER_LINK_STALE_POLICY")
                .map(|s| StalePolicy::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            health_check_interval: parse_env_duration_secs(
                lookup,
                "BROKER_LINK_HEALTH_CHECK_INTERVAL_SECS",
                stream_defaults.health_check_interval,
            ),
        };
        stream.validate()?;

        let auth_ttl = parse_env_duration_secs(lookup, "BROKER_LINK_AUTH_TTL_SECS", DEFAULT_AUTH_TTL);
        if auth_ttl.is_zero() {
            return Err(ConfigurationError::ZeroDuration { name: "auth_ttl" }.into());
        }

        let http_timeout =
            parse_env_duration_secs(lookup, "BROKER_LINK_HTTP_TIMEOUT_SECS", Duration::from_secs(10));
        if http_timeout.is_zero() {
            return Err(ConfigurationError::ZeroDuration {
                name: "http_timeout",
            }
            .into());
        }

        Ok(Self {
            kite,
            retry,
            auth_ttl,
            stream,
            tick_mode: lookup("BROKER_LINK_TICK_MODE")
                .map(|s| TickMode::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            instruments: lookup("BROKER_LINK_INSTRUMENTS")
                .map(|s| parse_instruments(&s))
                .unwrap_or_default(),
            http_timeout,
            server: ServerSettings {
                health_port: parse_env_u16(
                    lookup,
                    "BROKER_LINK_HEALTH_PORT",
                    ServerSettings::default().health_port,
                ),
            },
        })
    }

    /// Session credential, if an access token was configured.
    #[must_use]
    pub fn session(&self) -> Option<SessionCredential> {
        let token = self.kite.access_token.as_deref()?;
        SessionCredential::new(self.kite.api_key.clone(), token).ok()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Settings parsed but are inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigurationError),
}

/// Parse a comma separated instrument list. Entries that are not tokens are
/// skipped with a warning; duplicates are kept for the subscription set to
/// absorb.
#[must_use]
pub fn parse_instruments(raw: &str) -> Vec<InstrumentToken> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(token) => Some(token),
            Err(_) => {
                tracing::warn!(entry = s, "Ignoring invalid instrument token");
                None
            }
        })
        .collect()
}

fn parse_env_u16(lookup: Lookup<'_>, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(lookup: Lookup<'_>, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(lookup: Lookup<'_>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(lookup: Lookup<'_>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<LinkConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        LinkConfig::from_lookup(&|key| env.get(key).cloned())
    }

    #[test]
    fn api_key_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar(k)) if k == "KITE_API_KEY"));
        assert!(matches!(
            load(&[("KITE_API_KEY", "  ")]),
            Err(ConfigError::EmptyValue(_))
        ));
    }

    #[test]
    fn defaults_when_only_key_set() {
        let config = load(&[("KITE_API_KEY", "key")]).unwrap();

        assert_eq!(config.kite.api_url, DEFAULT_API_URL);
        assert_eq!(config.kite.ticker_url, DEFAULT_TICKER_URL);
        assert!(config.kite.access_token.is_none());
        assert!(config.session().is_none());
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.stream, StreamConfig::default());
        assert_eq!(config.auth_ttl, DEFAULT_AUTH_TTL);
        assert_eq!(config.tick_mode, TickMode::Quote);
        assert!(config.instruments.is_empty());
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn overrides_applied() {
        let config = load(&[
            ("KITE_API_KEY", "key"),
            ("KITE_ACCESS_TOKEN", "token"),
            ("BROKER_LINK_RETRY_MAX_ATTEMPTS", "5"),
            ("BROKER_LINK_RECONNECT_BASE_DELAY_MS", "500"),
            ("BROKER_LINK_MAX_RECONNECT_ATTEMPTS", "7"),
            ("BROKER_LINK_STALE_POLICY", "Reconnect"),
            ("BROKER_LINK_TICK_MODE", "full"),
            ("BROKER_LINK_INSTRUMENTS", "738561, 256265,,"),
            ("BROKER_LINK_HEALTH_PORT", "9100"),
        ])
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.stream.reconnect_base_delay, Duration::from_millis(500));
        assert_eq!(config.stream.max_reconnect_attempts, 7);
        assert_eq!(config.stream.stale_policy, StalePolicy::Reconnect);
        assert_eq!(config.tick_mode, TickMode::Full);
        assert_eq!(config.instruments, vec![738_561, 256_265]);
        assert_eq!(config.server.health_port, 9100);

        let session = config.session().unwrap();
        assert_eq!(session.api_key(), "key");
        assert_eq!(session.access_token(), "token");
    }

    #[test]
    fn unparseable_values_fall_back() {
        let config = load(&[
            ("KITE_API_KEY", "key"),
            ("BROKER_LINK_RETRY_MAX_ATTEMPTS", "many"),
            ("BROKER_LINK_HEALTH_PORT", "99999"),
        ])
        .unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn inconsistent_values_rejected() {
        assert!(matches!(
            load(&[("KITE_API_KEY", "key"), ("BROKER_LINK_RETRY_MAX_ATTEMPTS", "0")]),
            Err(ConfigError::Invalid(ConfigurationError::ZeroAttempts { .. }))
        ));
        assert!(matches!(
            load(&[
                ("KITE_API_KEY", "key"),
                ("BROKER_LINK_STALE_DEGRADED_SECS", "600"),
                ("BROKER_LINK_STALE_DEAD_SECS", "300"),
            ]),
            Err(ConfigError::Invalid(ConfigurationError::ThresholdOrder { .. }))
        ));
        assert!(matches!(
            load(&[("KITE_API_KEY", "key"), ("BROKER_LINK_AUTH_TTL_SECS", "0")]),
            Err(ConfigError::Invalid(ConfigurationError::ZeroDuration { name: "auth_ttl" }))
        ));
    }

    #[test]
    fn instrument_list_skips_garbage() {
        assert_eq!(parse_instruments("1,abc, 2 ,-3,"), vec![1, 2]);
        assert!(parse_instruments("").is_empty());
    }

    #[test]
    fn access_token_redacted_in_debug() {
        let config = load(&[("KITE_API_KEY", "key"), ("KITE_ACCESS_TOKEN", "s3cret")]).unwrap();
        let debug = format!("{:?}", config.kite);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
