//! Session check and liveness probe

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use draftsync_core::ports::IRemoteSyncClient;

use crate::common;

#[tokio::test]
async fn test_valid_session() {
    let (server, client) = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "user1", "username": "admin"
        })))
        .mount(&server)
        .await;

    assert!(client.is_authenticated().await.unwrap());
}

#[tokio::test]
async fn test_rejected_session() {
    let (server, client) = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(!client.is_authenticated().await.unwrap());
}

#[tokio::test]
async fn test_session_check_server_error_propagates() {
    let (server, client) = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    assert!(client.is_authenticated().await.is_err());
}

#[tokio::test]
async fn test_ping() {
    let (server, client) = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/api/system/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(1)
        .mount(&server)
        .await;

    client.probe_liveness().await.expect("ping failed");
}
