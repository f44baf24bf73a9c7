//! Chunk upload: payload shape and import summary mapping

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use draftsync_core::ports::{IRemoteSyncClient, RemoteFault};

use crate::common::{self, TOKEN};

#[tokio::test]
async fn test_upload_posts_chunk_and_maps_counts() {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/api/dataValueSets"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_partial_json(serde_json::json!({
            "dataValues": [{"dataSet": "dsMonthly", "dataElement": "de0", "value": "0"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "httpStatus": "OK",
            "response": {
                "status": "SUCCESS",
                "importCount": {"imported": 2, "updated": 1, "ignored": 0, "deleted": 0}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let drafts = common::drafts(3);
    common::stage(&client, &drafts).await;
    assert_eq!(client.staged_count(), 3);

    let outcome = client.upload_staged(&drafts).await.expect("upload failed");

    assert_eq!(outcome.imported, 2);
    assert_eq!(outcome.updated, 1);
    assert!(outcome.rejected.is_empty());
    assert_eq!(client.staged_count(), 0);
}

#[tokio::test]
async fn test_upload_reports_rejected_positions() {
    let (server, client) = common::setup().await;
    common::mount_import(
        &server,
        200,
        serde_json::json!({
            "status": "WARNING",
            "importCount": {"imported": 2, "ignored": 2},
            "conflicts": [{"object": "de1", "value": "Value must be numeric", "indexes": [1]}],
            "rejectedIndexes": [3]
        }),
    )
    .await;

    let drafts = common::drafts(4);
    common::stage(&client, &drafts).await;
    let outcome = client.upload_staged(&drafts).await.unwrap();

    assert_eq!(
        outcome.rejected,
        vec![drafts[1].identity(), drafts[3].identity()]
    );
    assert!(!outcome.is_rejected(&drafts[0].identity()));
}

#[tokio::test]
async fn test_conflict_status_with_summary_is_a_rejection() {
    let (server, client) = common::setup().await;
    common::mount_import(
        &server,
        409,
        serde_json::json!({
            "httpStatus": "Conflict",
            "response": {
                "status": "WARNING",
                "importCount": {"imported": 1, "ignored": 1},
                "rejectedIndexes": [0]
            }
        }),
    )
    .await;

    let drafts = common::drafts(2);
    common::stage(&client, &drafts).await;
    let outcome = client.upload_staged(&drafts).await.unwrap();

    assert_eq!(outcome.imported, 1);
    assert_eq!(outcome.rejected, vec![drafts[0].identity()]);
}

#[tokio::test]
async fn test_whole_batch_refused_is_a_fault() {
    let (server, client) = common::setup().await;
    common::mount_import(
        &server,
        409,
        serde_json::json!({
            "response": {"status": "ERROR", "description": "Data set is locked"}
        }),
    )
    .await;

    let drafts = common::drafts(2);
    common::stage(&client, &drafts).await;
    let err = client.upload_staged(&drafts).await.unwrap_err();
    let fault = err.chain().find_map(|e| e.downcast_ref::<RemoteFault>());

    assert_eq!(
        fault,
        Some(&RemoteFault::Http {
            status: 409,
            message: "Data set is locked".to_string()
        })
    );
}

#[tokio::test]
async fn test_server_error_keeps_drafts_staged() {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/api/dataValueSets"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let drafts = common::drafts(2);
    common::stage(&client, &drafts).await;
    let err = client.upload_staged(&drafts).await.unwrap_err();

    let fault = err.chain().find_map(|e| e.downcast_ref::<RemoteFault>());
    assert_eq!(fault.and_then(RemoteFault::status), Some(503));
    assert_eq!(client.staged_count(), 2);
}

#[tokio::test]
async fn test_unstaged_drafts_are_not_sent() {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/api/dataValueSets"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let drafts = common::drafts(3);
    common::stage(&client, &drafts[..2]).await;

    let err = client.upload_staged(&drafts).await.unwrap_err();
    assert!(err.to_string().contains("was not staged"));
    assert_eq!(client.staged_count(), 2);
}

#[tokio::test]
async fn test_discarded_drafts_must_be_staged_again() {
    let (server, client) = common::setup().await;
    common::mount_import(
        &server,
        200,
        serde_json::json!({"status": "SUCCESS", "importCount": {"imported": 2}}),
    )
    .await;

    let drafts = common::drafts(2);
    common::stage(&client, &drafts).await;
    client.discard_staged().await.unwrap();
    assert!(client.upload_staged(&drafts).await.is_err());

    common::stage(&client, &drafts).await;
    let outcome = client.upload_staged(&drafts).await.expect("upload failed");
    assert_eq!(outcome.imported, 2);
    assert_eq!(client.staged_count(), 0);
}
