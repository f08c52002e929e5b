use picsche_backend::{
    models::usage::UsageRecord,
    services::{
        credentials::StaticTokenProvider,
        usage_store::{FirestoreUsageStore, StoreError, UsageStore},
    },
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::TEST_TOKEN;

const DOCUMENT_PATH: &str = "/v1/projects/test-project/databases/(default)/documents/free_usage/u1";

fn firestore_store(mock_server: &MockServer) -> FirestoreUsageStore {
    FirestoreUsageStore::new(
        reqwest::Client::new(),
        Arc::new(StaticTokenProvider::new(TEST_TOKEN)),
        &mock_server.uri(),
        "test-project",
        "(default)",
        "free_usage",
    )
}

#[tokio::test]
async fn test_missing_document_reads_as_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOCUMENT_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "status": "NOT_FOUND" }
        })))
        .mount(&mock_server)
        .await;

    let record = firestore_store(&mock_server).get("u1").await.unwrap();

    assert!(record.is_none());
}

#[tokio::test]
async fn test_existing_document_is_decoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOCUMENT_PATH))
        .and(header("Authorization", "Bearer ya29.test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/test-project/databases/(default)/documents/free_usage/u1",
            "fields": {
                "usage_count": { "integerValue": "2" },
                "reward_grants": { "integerValue": "1" },
                "month": { "stringValue": "2024-05" }
            },
            "createTime": "2024-05-01T00:00:00Z",
            "updateTime": "2024-05-02T00:00:00Z"
        })))
        .mount(&mock_server)
        .await;

    let record = firestore_store(&mock_server).get("u1").await.unwrap();

    assert_eq!(
        record,
        Some(UsageRecord {
            usage_count: 2,
            reward_grants: 1,
            month: "2024-05".to_string(),
        })
    );
}

#[tokio::test]
async fn test_set_overwrites_whole_document() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(DOCUMENT_PATH))
        .and(header("Authorization", "Bearer ya29.test-token"))
        .and(body_json(json!({
            "fields": {
                "usage_count": { "integerValue": "1" },
                "reward_grants": { "integerValue": "0" },
                "month": { "stringValue": "2024-06" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let record = UsageRecord {
        usage_count: 1,
        reward_grants: 0,
        month: "2024-06".to_string(),
    };
    firestore_store(&mock_server)
        .set("u1", &record)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_server_error_is_surfaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOCUMENT_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let result = firestore_store(&mock_server).get("u1").await;

    assert!(matches!(
        result,
        Err(StoreError::Firestore { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_dot_segment_user_id_never_reaches_firestore() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": [] })))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let store = firestore_store(&mock_server);

    assert!(matches!(
        store.get("..").await,
        Err(StoreError::InvalidDocumentId(_))
    ));
    assert!(matches!(
        store.set("..", &UsageRecord::fresh("2024-05")).await,
        Err(StoreError::InvalidDocumentId(_))
    ));
}
