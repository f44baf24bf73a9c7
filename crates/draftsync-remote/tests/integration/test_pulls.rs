//! Incremental pulls of data values and metadata

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use draftsync_core::ports::IRemoteSyncClient;

use crate::common;

#[tokio::test]
async fn test_first_pull_starts_from_epoch() {
    let (server, client) = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/api/dataValueSets"))
        .and(query_param("lastUpdated", "1970-01-01T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "dataValues": [
                {"dataElement": "de1", "value": "1"},
                {"dataElement": "de2", "value": "2"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client.pull_updates().await.expect("pull failed");
    assert_eq!(summary.received, 2);
}

#[tokio::test]
async fn test_second_pull_advances_watermark() {
    let (server, client) = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/api/dataValueSets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    client.pull_updates().await.unwrap();
    client.pull_updates().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let since = |i: usize| {
        requests[i]
            .url
            .query_pairs()
            .find(|(k, _)| k == "lastUpdated")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    };
    assert_eq!(since(0), "1970-01-01T00:00:00.000Z");
    assert_ne!(since(1), since(0));
}

#[tokio::test]
async fn test_metadata_pull_counts_objects() {
    let (server, client) = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/api/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "system": {"version": "2.40"},
            "dataElements": [{"id": "a"}, {"id": "b"}],
            "dataSets": [{"id": "c"}]
        })))
        .mount(&server)
        .await;

    let summary = client.pull_metadata().await.unwrap();
    assert_eq!(summary.received, 3);
}

#[tokio::test]
async fn test_failed_pull_keeps_watermark() {
    let (server, client) = common::setup().await;
    Mock::given(method("GET"))
        .and(path("/api/dataValueSets"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dataValueSets"))
        .and(query_param("lastUpdated", "1970-01-01T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "dataValues": []
        })))
        .mount(&server)
        .await;

    assert!(client.pull_updates().await.is_err());
    assert_eq!(client.pull_updates().await.unwrap().received, 0);
}
