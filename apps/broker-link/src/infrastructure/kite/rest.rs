//! Kite Connect REST Client
//!
//! Thin `reqwest` wrapper over the v3 REST API. Every response uses the
//! envelope `{"status": "success"|"error", "data"|"message", "error_type"}`;
//! failures are mapped onto [`BrokerError`] so the retry layer can tell
//! throttling and outages apart from rejected credentials.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::application::ports::AuthProbe;
use crate::domain::errors::BrokerError;
use crate::domain::resilience::classify_status;
use crate::domain::session::SessionCredential;

/// Production REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.kite.trade";

const KITE_VERSION: &str = "3";

/// Account profile returned by `GET /user/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    /// Broker user id.
    pub user_id: String,
    /// Display name.
    #[serde(default)]
    pub user_name: String,
    /// Registered email.
    #[serde(default)]
    pub email: String,
    /// Broker code.
    #[serde(default)]
    pub broker: String,
    /// Exchanges enabled for the account.
    #[serde(default)]
    pub exchanges: Vec<String>,
}

/// Net and day positions returned by `GET /portfolio/positions`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Positions {
    /// Net positions across days.
    #[serde(default)]
    pub net: Vec<serde_json::Value>,
    /// Positions opened today.
    #[serde(default)]
    pub day: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_type: String,
}

/// Kite Connect REST client.
#[derive(Debug, Clone)]
pub struct KiteRestClient {
    client: Client,
    base_url: String,
}

impl KiteRestClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Network` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the account profile. Cheapest authenticated call, used as the
    /// auth probe.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` for transport failures and non-success responses.
    pub async fn profile(&self, credential: &SessionCredential) -> Result<UserProfile, BrokerError> {
        self.get(credential, "/user/profile").await
    }

    /// Fetch open positions.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` for transport failures and non-success responses.
    pub async fn positions(&self, credential: &SessionCredential) -> Result<Positions, BrokerError> {
        self.get(credential, "/portfolio/positions").await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        credential: &SessionCredential,
        path: &str,
    ) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header("X-Kite-Version", KITE_VERSION)
            .header("Authorization", credential.authorization_header())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(map_error_response(status, &body));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            BrokerError::Unexpected {
                message: format!("malformed response from {path}: {e}"),
            }
        })?;
        envelope.data.ok_or_else(|| BrokerError::Unexpected {
            message: format!("response from {path} has no data"),
        })
    }
}

#[async_trait]
impl AuthProbe for KiteRestClient {
    async fn probe_auth(&self, credential: &SessionCredential) -> Result<(), BrokerError> {
        let profile = self.profile(credential).await?;
        tracing::debug!(user_id = %profile.user_id, "Auth probe confirmed session");
        Ok(())
    }
}

fn map_transport_error(err: reqwest::Error) -> BrokerError {
    let message = err.to_string();
    if err.is_timeout() {
        BrokerError::Timeout { message }
    } else if err.is_connect() || err.is_request() {
        BrokerError::Network { message }
    } else {
        BrokerError::Unexpected { message }
    }
}

/// Map a non-success response to a `BrokerError`. `TokenException` always
/// means the session is unusable, whatever the status code. Only the
/// statuses `classify_status` treats as transient become `Server`.
fn map_error_response(status: StatusCode, body: &str) -> BrokerError {
    let (message, error_type) = serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| (body.to_string(), String::new()),
        |env| (env.message, env.error_type),
    );
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    if error_type == "TokenException" {
        return BrokerError::Authentication { message };
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BrokerError::Authentication { message },
        StatusCode::TOO_MANY_REQUESTS => BrokerError::RateLimited { message },
        s if classify_status(s.as_u16()).is_transient() => BrokerError::Server {
            status: s.as_u16(),
            message,
        },
        s => BrokerError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_exception_is_authentication() {
        let err = map_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"status":"error","message":"Incorrect `api_key` or `access_token`.","error_type":"TokenException"}"#,
        );
        assert!(err.is_authentication());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            map_error_response(StatusCode::FORBIDDEN, "{}"),
            BrokerError::Authentication { .. }
        ));
        assert!(matches!(
            map_error_response(StatusCode::TOO_MANY_REQUESTS, ""),
            BrokerError::RateLimited { .. }
        ));
        assert!(matches!(
            map_error_response(StatusCode::BAD_GATEWAY, "<html>"),
            BrokerError::Server { status: 502, .. }
        ));
        assert!(matches!(
            map_error_response(StatusCode::BAD_REQUEST, r#"{"message":"bad","error_type":"InputException"}"#),
            BrokerError::Api { status: 400, .. }
        ));
    }

    #[test]
    fn unsupported_server_status_is_permanent() {
        use crate::domain::resilience::{Classify, FailureKind};

        for status in [StatusCode::NOT_IMPLEMENTED, StatusCode::HTTP_VERSION_NOT_SUPPORTED] {
            let err = map_error_response(status, "");
            assert!(matches!(err, BrokerError::Api { .. }), "{status}");
            assert_eq!(err.failure_kind(), FailureKind::Permanent);
            assert_eq!(err.failure_kind(), classify_status(status.as_u16()));
        }
    }

    #[test]
    fn empty_message_falls_back_to_status() {
        let err = map_error_response(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(
            err,
            BrokerError::Server {
                status: 503,
                message: "503 Service Unavailable".to_string()
            }
        );
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = KiteRestClient::new("http://localhost:1234/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://localhost:1234");
    }
}
