use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use checkwatch::api::create_router;
use checkwatch::models::{Check, Status};
use checkwatch::store::{FileStore, RecordStore, CHECKS};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

async fn store_with_checks(dir: &tempfile::TempDir) -> Arc<dyn RecordStore> {
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(dir.path()));
    let mut up = Check::new("uuuuuuuuuuuuuuuuuuuu", "http://a.example", "get", vec![200], 1);
    up.state = Status::Up;
    up.last_checked = Some(1_700_000_000_000);
    let down = Check::new("dddddddddddddddddddd", "http://b.example", "post", vec![201], 1);
    for check in [&up, &down] {
        store
            .create(CHECKS, &check.id, &serde_json::to_value(check).unwrap())
            .await
            .unwrap();
    }
    store
}

async fn get(store: Arc<dyn RecordStore>, uri: &str) -> (StatusCode, Value) {
    let response = create_router(store)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

#[tokio::test]
async fn lists_all_checks_with_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_checks(&dir).await;

    let (status, body) = get(store, "/api/checks").await;
    assert_eq!(status, StatusCode::OK);
    let checks = body.as_array().unwrap();
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0]["id"], "dddddddddddddddddddd");
    assert_eq!(checks[0]["state"], "down");
    assert_eq!(checks[0]["lastChecked"], Value::Null);
    assert_eq!(checks[1]["state"], "up");
    assert_eq!(checks[1]["lastChecked"], 1_700_000_000_000i64);
}

#[tokio::test]
async fn single_check_and_missing_check() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_checks(&dir).await;

    let (status, body) = get(Arc::clone(&store), "/api/checks/uuuuuuuuuuuuuuuuuuuu").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "http://a.example");

    let (status, _) = get(Arc::clone(&store), "/api/checks/nnnnnnnnnnnnnnnnnnnn").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(store, "/api/checks/nothere").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ids_reaching_outside_the_collection_are_bad_requests() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(&data));
    std::fs::create_dir_all(data.join(CHECKS)).unwrap();
    let outside = Check::new("oooooooooooooooooooo", "http://secret.example", "get", vec![200], 1);
    std::fs::write(dir.path().join("outside.json"), serde_json::to_vec(&outside).unwrap()).unwrap();

    for uri in ["/api/checks/..%2F..%2Foutside", "/api/checks/..%2F..%2F..%2Fetc%2Fpasswd", "/api/checks/.."] {
        let (status, body) = get(Arc::clone(&store), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body, Value::Null);
    }
}
