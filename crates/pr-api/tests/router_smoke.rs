use axum::{body::Body, http::Request, http::StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::Ordering;
use tower::ServiceExt;

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn probes_and_heartbeat() {
    let app = pr_api::create_router(pr_api::test_state());

    let (status, body) = get(app.clone(), "/livez").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["catalog"], "memory");

    let (status, body) = get(app, "/recommender/heartbeat").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "alive": true }));
}

#[tokio::test]
async fn readyz_returns_service_unavailable_when_not_ready() {
    let state = pr_api::test_state();
    state.readiness.store(false, Ordering::SeqCst);
    let app = pr_api::create_router(state);

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "service_unavailable");
}

#[tokio::test]
async fn unknown_job_is_404_with_request_id() {
    let app = pr_api::create_router(pr_api::test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/recommender/job/01ARZ3NDEKTSV4RRFFQ69G5FAV")
                .header("x-request-id", "req-404")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "req-404");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "not_found");
    assert_eq!(body["request_id"], "req-404");
}
