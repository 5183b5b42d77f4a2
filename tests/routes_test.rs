use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use lingua_progress::progression::CefrLevel;

mod common;

use common::{create_test_app, leveled_item, seed, QUESTION_TYPE};

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_root() {
    let (_store, app) = create_test_app();

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "lingua-progress");
}

#[tokio::test]
async fn test_unknown_route_returns_not_found() {
    let (_store, app) = create_test_app();

    let (status, body) = send(&app, get("/api/nowhere")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_record_attempt_updates_level() {
    let (_store, app) = create_test_app();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/users/u1/levels/speaking/{QUESTION_TYPE}/attempts"),
            json!({ "score": 90 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["level"]["numericLevel"], 1.15);
    assert_eq!(body["data"]["level"]["cefrLevel"], "A1");
    assert_eq!(body["data"]["usageRecorded"], false);

    let (status, body) = send(&app, get("/api/users/u1/levels")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_out_of_range_score_is_a_validation_error() {
    let (_store, app) = create_test_app();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/users/u1/levels/writing/essay/attempts",
            json!({ "score": 140 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_skill_area_is_a_validation_error() {
    let (_store, app) = create_test_app();

    let (status, body) = send(
        &app,
        get("/api/users/u1/prompts/next?skillArea=cooking&questionType=essay"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_next_prompt_serves_catalog_item() {
    let (store, app) = create_test_app();
    seed(&store, &[leveled_item("a1-x", CefrLevel::A1)]).await;

    let (status, body) = send(
        &app,
        get(&format!(
            "/api/users/u1/prompts/next?skillArea=speaking&questionType={QUESTION_TYPE}"
        )),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["item"]["id"], "a1-x");
    assert_eq!(body["data"]["source"], "generated");
    assert_eq!(body["data"]["userLevel"], "A1");
}

#[tokio::test]
async fn test_next_prompt_exhausted_is_not_found() {
    let (_store, app) = create_test_app();

    let (status, body) = send(
        &app,
        get("/api/users/u1/prompts/next?skillArea=reading&questionType=gist"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NO_ITEM_AVAILABLE");
}

#[tokio::test]
async fn test_reset_level_and_timezone() {
    let (_store, app) = create_test_app();

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            "/api/users/u1/levels/listening/dictation",
            json!({ "numericLevel": 3.2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cefrLevel"], "B1");

    let (status, body) = send(
        &app,
        json_request("PUT", "/api/users/u1/timezone", json!({ "timezone": "Europe/Berlin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["timezone"], "Europe/Berlin");

    let (status, _) = send(
        &app,
        json_request("PUT", "/api/users/u1/timezone", json!({ "timezone": "Nowhere/Land" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_progress_summary_window() {
    let (_store, app) = create_test_app();

    send(
        &app,
        json_request(
            "POST",
            "/api/users/u1/levels/reading/gist/attempts",
            json!({ "score": 75 }),
        ),
    )
    .await;

    let (status, body) = send(&app, get("/api/users/u1/progress?weeks=2")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["windowWeeks"], 2);
    assert_eq!(body["data"]["currentStreakDays"], 1);
    assert_eq!(body["data"]["totalAttempts"], 1);
    assert_eq!(body["data"]["timezone"], "UTC");
}
