use std::sync::Arc;

use axum::{Router, body::Body, http::Request, http::StatusCode};
use http_body_util::BodyExt;
use pr_common::catalog::Catalog;
use pr_common::queue::{JobRetention, JobStatus};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn listing(external_id: i64, bedrooms: i32, price: f64, lat: f64, lon: f64) -> Value {
    json!({
        "external_id": external_id,
        "comuna": "Centro",
        "lat": lat,
        "lon": lon,
        "bedrooms": bedrooms,
        "price": price,
        "raw": {"source": "portal"}
    })
}

async fn seed(app: &Router) {
    for body in [
        listing(3001, 2, 100_000.0, -33.45, -70.65),
        listing(3002, 2, 95_000.0, -33.46, -70.66),
        listing(3003, 3, 120_000.0, -33.47, -70.67),
    ] {
        let (status, response) =
            send(app, "POST", "/recommender/properties/notify", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["status"], "created");
    }
}

#[tokio::test]
async fn notify_upserts_and_lists_properties() {
    let app = pr_api::create_router(pr_api::test_state());
    seed(&app).await;

    let (status, response) = send(
        &app,
        "POST",
        "/recommender/properties/notify",
        Some(listing(3002, 2, 90_000.0, -33.46, -70.66)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "updated");
    assert_eq!(response["id"], 2);

    let (status, listed) = send(&app, "GET", "/recommender/properties", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 3);
    for key in ["external_id", "comuna", "lat", "lon", "bedrooms", "price"] {
        assert!(listed[0].get(key).is_some(), "missing {key}");
    }
    assert_eq!(listed[1]["price"], 90_000.0);
}

#[tokio::test]
async fn notify_rejects_negative_price() {
    let app = pr_api::create_router(pr_api::test_state());
    let (status, body) = send(
        &app,
        "POST",
        "/recommender/properties/notify",
        Some(listing(1, 2, -5.0, -33.45, -70.65)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn rule_based_job_end_to_end() {
    let state = pr_api::test_state();
    let app = pr_api::create_router(state.clone());
    seed(&app).await;

    let (status, handle) = send(&app, "POST", "/recommender/job/1/3001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(handle["status"], "PENDING");
    let task_id = handle["task_id"].as_str().unwrap().to_string();

    let (_, pending) = send(&app, "GET", &format!("/recommender/job/{task_id}"), None).await;
    assert_eq!(pending["ready"], false);
    assert!(pending["result"].is_null());

    let processed = pr_api::worker::process_next(&state, "test-worker").await;
    assert_eq!(processed, Some(JobStatus::Success));

    let (status, done) = send(&app, "GET", &format!("/recommender/job/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["ready"], true);
    assert_eq!(done["status"], "SUCCESS");

    let results = done["result"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["property"]["external_id"], 3002);
    let distance = results[0]["distance_km"].as_f64().unwrap();
    assert!((distance - 1.448).abs() < 0.01);
}

#[tokio::test]
async fn knn_job_ranks_across_communes() {
    let state = pr_api::test_state();
    let app = pr_api::create_router(state.clone());
    seed(&app).await;

    let mut far = listing(4001, 2, 80_000.0, -33.40, -70.60);
    far["comuna"] = json!("Norte");
    send(&app, "POST", "/recommender/properties/notify", Some(far)).await;

    let (status, handle) = send(&app, "POST", "/recommender/job/7/3001?strategy=knn", None).await;
    assert_eq!(status, StatusCode::OK);
    let task_id = handle["task_id"].as_str().unwrap().to_string();

    assert_eq!(
        pr_api::worker::process_next(&state, "test-worker").await,
        Some(JobStatus::Success)
    );

    let (_, done) = send(&app, "GET", &format!("/recommender/job/{task_id}"), None).await;
    let results = done["result"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r["property"]["external_id"] != 3001));
    assert!(results.iter().all(|r| r["similarity_distance"].is_number()));
}

#[tokio::test]
async fn missing_origin_reports_legacy_error() {
    let state = pr_api::test_state();
    let app = pr_api::create_router(state.clone());
    seed(&app).await;

    let (_, handle) = send(&app, "POST", "/recommender/job/1/9999", None).await;
    let task_id = handle["task_id"].as_str().unwrap().to_string();

    assert_eq!(
        pr_api::worker::process_next(&state, "test-worker").await,
        Some(JobStatus::Failure)
    );

    let (_, done) = send(&app, "GET", &format!("/recommender/job/{task_id}"), None).await;
    assert_eq!(done["ready"], true);
    assert_eq!(done["status"], "FAILURE");
    assert_eq!(done["result"], "error: property not found");
    assert_eq!(done["error_code"], "origin_not_found");
}

#[tokio::test]
async fn empty_catalog_fails_with_no_properties() {
    let state = pr_api::test_state();
    let app = pr_api::create_router(state.clone());

    let (_, handle) = send(&app, "POST", "/recommender/job/1/3001", None).await;
    let task_id = handle["task_id"].as_str().unwrap().to_string();
    pr_api::worker::process_next(&state, "test-worker").await;

    let (_, done) = send(&app, "GET", &format!("/recommender/job/{task_id}"), None).await;
    assert_eq!(done["result"], "error: no properties provided");
}

#[tokio::test]
async fn unknown_strategy_is_bad_request() {
    let app = pr_api::create_router(pr_api::test_state());
    let (status, body) = send(&app, "POST", "/recommender/job/1/3001?strategy=nearest", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn evicted_jobs_are_not_found_and_recent_ones_resolve() {
    let config = pr_api::AppConfig {
        job_retention: JobRetention {
            max_finished: 1,
            ..JobRetention::default()
        },
        ..pr_api::AppConfig::for_tests()
    };
    let state = Arc::new(pr_api::AppState::new(config, Catalog::in_memory()));
    let app = pr_api::create_router(state.clone());
    seed(&app).await;

    let mut task_ids = Vec::new();
    for _ in 0..2 {
        let (_, handle) = send(&app, "POST", "/recommender/job/1/3001", None).await;
        task_ids.push(handle["task_id"].as_str().unwrap().to_string());
    }
    for _ in 0..2 {
        assert_eq!(
            pr_api::worker::process_next(&state, "test-worker").await,
            Some(JobStatus::Success)
        );
    }

    let evicted = format!("/recommender/job/{}", task_ids[0]);
    let (status, body) = send(&app, "GET", &evicted, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let recent = format!("/recommender/job/{}", task_ids[1]);
    let (status, body) = send(&app, "GET", &recent, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
}
