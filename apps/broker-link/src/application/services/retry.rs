//! Retry Executor
//!
//! Runs a remote call with exponential backoff. Transient failures are
//! retried up to the attempt budget; permanent failures and the final
//! failure are handed back untouched so callers still see the broker's
//! own error.
//!
//! # Example
//!
//! ```rust,ignore
//! let retry = RetryExecutor::new(RetryConfig::default())?;
//! let profile = retry
//!     .execute("profile", || client.profile(&credential))
//!     .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::ConfigurationError;
use crate::domain::resilience::{BackoffPolicy, Classify, FailureKind};
use crate::infrastructure::metrics;

/// Retry parameters for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any delay.
    pub cap_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            cap_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `max_attempts` is zero or the cap is
    /// below the base delay.
    pub const fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::ZeroAttempts {
                name: "retry max_attempts",
            });
        }
        if self.cap_delay.as_nanos() < self.base_delay.as_nanos() {
            return Err(ConfigurationError::CapBelowBase {
                name: "retry delay",
                base: self.base_delay,
                cap: self.cap_delay,
            });
        }
        Ok(())
    }

    /// Backoff schedule derived from this config.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay, self.cap_delay)
    }
}

/// One failed attempt that is about to be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// Name of the retried operation.
    pub operation: String,
    /// Zero-based index of the attempt that failed.
    pub attempt_index: u32,
    /// Sleep before the next attempt.
    pub delay_before_next: Duration,
    /// Description of the failure.
    pub error: String,
}

/// Callback invoked for every retry.
pub type RetryObserver = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

/// Generic retry wrapper used by every outbound call.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    observer: Option<RetryObserver>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl RetryExecutor {
    /// Build an executor from a validated config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the config is invalid.
    pub fn new(config: RetryConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            config,
            observer: None,
        })
    }

    /// Attach a callback that sees every retry.
    #[must_use]
    pub fn with_observer(mut self, observer: impl Fn(&RetryAttempt) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `call` until it succeeds, fails permanently or runs out of
    /// attempts.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt made, unchanged.
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let backoff = self.config.backoff();
        let mut attempt = 0_u32;

        loop {
            let err = match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(operation, attempts = attempt + 1, "Call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = err.failure_kind();
            if kind == FailureKind::Permanent {
                tracing::debug!(operation, attempt, error = %err, "Permanent failure, not retrying");
                metrics::record_call_failure(operation, kind);
                return Err(err);
            }

            if attempt + 1 >= self.config.max_attempts {
                tracing::warn!(
                    operation,
                    attempts = attempt + 1,
                    error = %err,
                    "Transient failure, retries exhausted"
                );
                metrics::record_retries_exhausted(operation);
                return Err(err);
            }

            let delay = backoff.delay(attempt);
            let record = RetryAttempt {
                operation: operation.to_owned(),
                attempt_index: attempt,
                delay_before_next: delay,
                error: err.to_string(),
            };

            tracing::warn!(
                operation,
                attempt = attempt + 1,
                max_attempts = self.config.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                failure_kind = %kind,
                error = %err,
                "Transient failure, retrying"
            );
            metrics::record_retry(operation);
            if let Some(observer) = &self.observer {
                observer(&record);
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
