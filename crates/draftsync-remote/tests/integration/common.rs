//! Shared helpers for remote client integration tests
//!
//! Each helper mounts the endpoints a test needs and returns a client
//! pointing at the mock server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use draftsync_core::domain::{DraftRecord, FieldKey, InstanceKey};
use draftsync_core::ports::IRemoteSyncClient;
use draftsync_remote::{HttpRemoteSyncClient, RemoteClient};

pub const TOKEN: &str = "test-token";

/// Starts a mock server and a client authenticated with [`TOKEN`]
pub async fn setup() -> (MockServer, HttpRemoteSyncClient) {
    let server = MockServer::start().await;
    let client = RemoteClient::new(&server.uri(), Some(TOKEN.to_string())).unwrap();
    (server, HttpRemoteSyncClient::new(client))
}

/// Builds `n` drafts for one instance, one data element each
pub fn drafts(n: usize) -> Vec<DraftRecord> {
    let instance = InstanceKey::new("dsMonthly", "202403", "ouA", "default").unwrap();
    (0..n)
        .map(|i| {
            DraftRecord::new(
                instance.clone(),
                FieldKey::new(format!("de{i}"), "default").unwrap(),
                format!("{i}"),
            )
        })
        .collect()
}

/// Stages every draft, as a run does before uploading
pub async fn stage(client: &HttpRemoteSyncClient, drafts: &[DraftRecord]) {
    for draft in drafts {
        client.stage_locally(draft).await.unwrap();
    }
}

/// Mounts a POST /api/dataValueSets responding with the given status and body
pub async fn mount_import(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/dataValueSets"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
