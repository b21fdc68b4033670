mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::{row, state, RecordingExecutor};
use pretty_assertions::assert_eq;
use rowpath::{app, Settings};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn call(settings: Settings, exec: Arc<RecordingExecutor>, req: Request<Body>) -> (StatusCode, Value) {
    let res = app(state(exec, settings)).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn list_returns_envelope() {
    let exec = Arc::new(RecordingExecutor::new());
    exec.respond(
        "FROM \"articles\"",
        vec![row(json!({"id": 1, "title": "Hello", "author.name": "Ann"}))],
    );
    let (status, body) = call(Settings::default(), exec, get("/articles?$select=id,title,author")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"data": [{"id": 1, "title": "Hello", "author": {"name": "Ann"}}], "meta": {"count": 1}})
    );
}

#[tokio::test]
async fn query_errors_are_bad_requests() {
    let exec = Arc::new(RecordingExecutor::new());
    let (status, body) = call(Settings::default(), exec.clone(), get("/articles?nope=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": {"code": 400, "message": "unknown field in 'nope'", "detail": {"param": "nope"}}})
    );
    assert!(exec.sql().is_empty());
}

#[tokio::test]
async fn messages_follow_accept_language() {
    let exec = Arc::new(RecordingExecutor::new());
    let req = Request::builder()
        .uri("/articles?nope=1")
        .header(header::ACCEPT_LANGUAGE, "id-ID, en;q=0.5")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(Settings::default(), exec, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], json!("kolom tidak dikenal pada 'nope'"));
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let exec = Arc::new(RecordingExecutor::new());
    let (status, body) = call(Settings::default(), exec, get("/widgets")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": {"code": 404, "message": "widgets not found"}}));
}

#[tokio::test]
async fn create_responds_created() {
    let exec = Arc::new(RecordingExecutor::new());
    exec.respond("FROM \"articles\"", vec![row(json!({"id": 5, "title": "New"}))]);
    let req = Request::builder()
        .method("POST")
        .uri("/articles")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"id": 5, "title": "New"}"#))
        .unwrap();
    let (status, body) = call(Settings::default(), exec, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"data": {"id": 5, "title": "New"}}));
}

#[tokio::test]
async fn non_object_body_is_rejected() {
    let exec = Arc::new(RecordingExecutor::new());
    let req = Request::builder()
        .method("PUT")
        .uri("/articles/1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("[1, 2]"))
        .unwrap();
    let (status, body) = call(Settings::default(), exec.clone(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], json!("body must be a JSON object"));
    assert!(exec.sql().is_empty());
}

#[tokio::test]
async fn health_and_readiness() {
    let exec = Arc::new(RecordingExecutor::new());
    let (status, body) = call(Settings::default(), exec.clone(), get("/health")).await;
    assert_eq!((status, body), (StatusCode::OK, json!({"status": "ok"})));

    let (status, body) = call(Settings::default(), exec, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "database": "ok"}));
}

#[tokio::test]
async fn slow_reads_time_out() {
    let exec = Arc::new(RecordingExecutor::with_delay(Duration::from_millis(500)));
    let mut settings = Settings::default();
    settings.server.timeout_get = Duration::from_millis(20);
    let (status, body) = call(settings, exec, get("/articles")).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["error"]["code"], json!(408));
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let exec = Arc::new(RecordingExecutor::new());
    let mut settings = Settings::default();
    settings.server.body_limit = 64;
    let payload = json!({"title": "x".repeat(200)}).to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/articles")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .unwrap();
    let res = app(state(exec.clone(), settings)).oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(exec.sql().is_empty());
}
