//! Kite REST Client Integration Tests
//!
//! Runs the client against a mock HTTP server to check headers, envelope
//! parsing and the mapping of broker failures onto retry decisions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use broker_link::{AuthCache, AuthProbe, BrokerError, Classify, FailureKind, KiteRestClient};
use common::credential;

fn client(server: &MockServer) -> KiteRestClient {
    KiteRestClient::new(server.uri(), Duration::from_secs(5)).unwrap()
}

fn token_exception() -> ResponseTemplate {
    ResponseTemplate::new(403).set_body_json(json!({
        "status": "error",
        "message": "Incorrect `api_key` or `access_token`.",
        "error_type": "TokenException"
    }))
}

#[tokio::test]
async fn profile_sends_version_and_token_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .and(header("X-Kite-Version", "3"))
        .and(header("Authorization", "token test-key:test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "user_id": "AB1234",
                "user_name": "Test Trader",
                "email": "trader@example.com",
                "broker": "ZERODHA",
                "exchanges": ["NSE", "BSE", "NFO"]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profile = client(&server).profile(&credential()).await.unwrap();

    assert_eq!(profile.user_id, "AB1234");
    assert_eq!(profile.exchanges, vec!["NSE", "BSE", "NFO"]);
}

#[tokio::test]
async fn positions_parsed_from_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/portfolio/positions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "net": [{"tradingsymbol": "INFY", "quantity": 10}],
                "day": []
            }
        })))
        .mount(&server)
        .await;

    let positions = client(&server).positions(&credential()).await.unwrap();

    assert_eq!(positions.net.len(), 1);
    assert_eq!(positions.net[0]["tradingsymbol"], "INFY");
    assert!(positions.day.is_empty());
}

#[tokio::test]
async fn token_exception_is_permanent_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(token_exception())
        .mount(&server)
        .await;

    let err = client(&server).profile(&credential()).await.unwrap_err();

    assert!(err.is_authentication());
    assert_eq!(err.failure_kind(), FailureKind::Permanent);
}

#[tokio::test]
async fn unavailable_is_transient_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = client(&server).profile(&credential()).await.unwrap_err();

    assert_eq!(
        err,
        BrokerError::Server {
            status: 503,
            message: "upstream down".to_string()
        }
    );
    assert_eq!(err.failure_kind(), FailureKind::Transient);
}

#[tokio::test]
async fn not_implemented_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/portfolio/positions"))
        .respond_with(ResponseTemplate::new(501).set_body_string("not implemented"))
        .mount(&server)
        .await;

    let err = client(&server).positions(&credential()).await.unwrap_err();

    assert!(matches!(err, BrokerError::Api { status: 501, .. }));
    assert_eq!(err.failure_kind(), FailureKind::Permanent);
}

#[tokio::test]
async fn throttling_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/portfolio/positions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "status": "error",
            "message": "Too many requests",
            "error_type": "NetworkException"
        })))
        .mount(&server)
        .await;

    let err = client(&server).positions(&credential()).await.unwrap_err();

    assert!(matches!(err, BrokerError::RateLimited { .. }));
    assert!(err.failure_kind().is_transient());
}

#[tokio::test]
async fn malformed_success_body_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server).profile(&credential()).await.unwrap_err();

    assert!(matches!(err, BrokerError::Unexpected { .. }));
}

#[tokio::test]
async fn unreachable_host_is_network_failure() {
    let client = KiteRestClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();

    let err = client.profile(&credential()).await.unwrap_err();

    assert!(matches!(
        err,
        BrokerError::Network { .. } | BrokerError::Timeout { .. }
    ));
    assert!(err.failure_kind().is_transient());
}

#[tokio::test]
async fn rest_client_drives_auth_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(token_exception())
        .expect(1)
        .mount(&server)
        .await;

    let probe: Arc<dyn AuthProbe> = Arc::new(client(&server));
    let auth = AuthCache::new(probe, common::retry(3), Duration::from_secs(60));
    auth.set_session(credential());

    assert!(!auth.is_valid().await);
    assert!(!auth.is_valid().await);
}
