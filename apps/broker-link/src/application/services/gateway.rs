//! Broker Gateway
//!
//! Entry point for authenticated REST calls: refuses to call out on a
//! session known to be bad, retries transient failures, and feeds
//! authentication rejections back into the auth cache.

use std::future::Future;
use std::sync::Arc;

use crate::application::services::auth_cache::AuthCache;
use crate::application::services::retry::RetryExecutor;
use crate::domain::errors::BrokerError;
use crate::domain::session::SessionCredential;

/// Auth gate plus retry around outbound broker calls.
#[derive(Debug, Clone)]
pub struct BrokerGateway {
    auth: Arc<AuthCache>,
    retry: RetryExecutor,
}

impl BrokerGateway {
    /// Create a gateway.
    #[must_use]
    pub const fn new(auth: Arc<AuthCache>, retry: RetryExecutor) -> Self {
        Self { auth, retry }
    }

    /// The shared auth cache.
    #[must_use]
    pub const fn auth(&self) -> &Arc<AuthCache> {
        &self.auth
    }

    /// Run an authenticated call.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Authentication` without calling out if the
    /// session is missing or invalid; otherwise the call's own error after
    /// retries.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, BrokerError>
    where
        F: FnMut(SessionCredential) -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let credential = self.auth.require_valid().await.inspect_err(|err| {
            tracing::warn!(operation, error = %err, "Refusing broker call without valid session");
        })?;

        let result = self
            .retry
            .execute(operation, || call(credential.clone()))
            .await;

        if let Err(err) = &result
            && err.is_authentication()
        {
            self.auth.mark_invalid();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::application::ports::AuthProbe;
    use crate::application::services::retry::RetryConfig;

    struct AlwaysValid;

    #[async_trait]
    impl AuthProbe for AlwaysValid {
        async fn probe_auth(&self, _credential: &SessionCredential) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn gateway(with_session: bool) -> BrokerGateway {
        let retry = RetryExecutor::new(RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            cap_delay: Duration::from_millis(10),
        })
        .unwrap();
        let auth = Arc::new(AuthCache::new(
            Arc::new(AlwaysValid),
            retry.clone(),
            Duration::from_secs(60),
        ));
        if with_session {
            auth.set_session(SessionCredential::new("key", "token").unwrap());
        }
        BrokerGateway::new(auth, retry)
    }

    #[tokio::test(start_paused = true)]
    async fn fails_fast_without_session() {
        let gateway = gateway(false);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = gateway
            .call("positions", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(result.unwrap_err().is_authentication());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn passes_credential_to_call() {
        let gateway = gateway(true);

        let key = gateway
            .call("profile", |credential| async move {
                Ok(credential.api_key().to_string())
            })
            .await
            .unwrap();

        assert_eq!(key, "key");
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_rejection_invalidates_cache() {
        let gateway = gateway(true);
        assert!(gateway.auth().is_valid().await);

        let result: Result<(), _> = gateway
            .call("orders", |_| async {
                Err(BrokerError::authentication("TokenException"))
            })
            .await;

        assert!(result.is_err());
        assert!(!gateway.auth().snapshot().is_valid);
        assert!(!gateway.auth().is_valid().await);
    }
}
