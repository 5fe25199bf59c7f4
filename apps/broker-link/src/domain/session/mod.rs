//! Broker session credential.

use std::fmt;

use crate::domain::errors::BrokerError;

/// API key plus the day's access token. Both are sent on every REST call
/// and on the ticker handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    api_key: String,
    access_token: String,
}

impl SessionCredential {
    /// Create a credential, rejecting empty values.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Authentication` if either value is empty.
    pub fn new(
        api_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let api_key = api_key.into();
        let access_token = access_token.into();

        if api_key.trim().is_empty() {
            return Err(BrokerError::authentication("API key cannot be empty"));
        }
        if access_token.trim().is_empty() {
            return Err(BrokerError::authentication("access token cannot be empty"));
        }

        Ok(Self {
            api_key,
            access_token,
        })
    }

    /// The application's API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The session access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Value of the `Authorization` header expected by the REST API.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("api_key", &self.api_key)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}
