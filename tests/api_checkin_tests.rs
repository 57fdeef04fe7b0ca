// SPDX-License-Identifier: MIT

//! HTTP-level tests for token issuance and check-in admission.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use stamp_rally::middleware::identity::{DEVICE_COOKIE, DEVICE_HEADER};
use stamp_rally::models::RewardMode;
use tower::ServiceExt;

mod common;
use common::{body_json, create_test_app, make_activity};

fn token_request(activity_id: &str, location_id: &str, device: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!(
            "/api/activities/{}/locations/{}/token",
            activity_id, location_id
        ))
        .header(DEVICE_HEADER, device)
        .body(Body::empty())
        .unwrap()
}

fn checkin_request(activity_id: &str, location_id: &str, token: &str, device: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/activities/{}/check-in", activity_id))
        .header(DEVICE_HEADER, device)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "location_id": location_id, "token": token }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let test_app = create_test_app(vec![]);

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_token_then_checkin_flow() {
    let test_app = create_test_app(vec![make_activity("act", 1, 2, RewardMode::Full)]);

    let response = test_app
        .app
        .clone()
        .oneshot(token_request("act", "loc-0", "dev-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let token = body["token"].as_str().expect("token in response");
    assert!(body["expires_at"].as_str().is_some());

    let response = test_app
        .app
        .clone()
        .oneshot(checkin_request("act", "loc-0", token, "dev-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["check_in"]["location_id"], "loc-0");
    assert_eq!(body["check_in"]["activity_id"], "act");
    assert_eq!(body["contact_required"], false);
    assert_eq!(body["reward"]["eligible"], false);
}

#[tokio::test]
async fn test_unknown_activity_and_location() {
    let test_app = create_test_app(vec![make_activity("act", 1, 1, RewardMode::Full)]);

    let response = test_app
        .app
        .clone()
        .oneshot(token_request("nope", "loc-0", "dev-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "not_found");

    let response = test_app
        .app
        .clone()
        .oneshot(token_request("act", "loc-99", "dev-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "location_not_found");
}

#[tokio::test]
async fn test_replayed_token_is_unauthorized() {
    let test_app = create_test_app(vec![make_activity("act", 2, 1, RewardMode::Full)]);

    let response = test_app
        .app
        .clone()
        .oneshot(token_request("act", "loc-0", "dev-1"))
        .await
        .unwrap();
    let token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = test_app
        .app
        .clone()
        .oneshot(checkin_request("act", "loc-0", &token, "dev-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = test_app
        .app
        .clone()
        .oneshot(checkin_request("act", "loc-0", &token, "dev-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_limit_exceeded_at_issuance() {
    let test_app = create_test_app(vec![make_activity("act", 1, 1, RewardMode::Full)]);

    let response = test_app
        .app
        .clone()
        .oneshot(token_request("act", "loc-0", "dev-1"))
        .await
        .unwrap();
    let token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    test_app
        .app
        .clone()
        .oneshot(checkin_request("act", "loc-0", &token, "dev-1"))
        .await
        .unwrap();

    // The slot is spent; further issuance for it is refused up-front.
    let response = test_app
        .app
        .clone()
        .oneshot(token_request("act", "loc-0", "dev-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "limit_exceeded");
}

#[tokio::test]
async fn test_fresh_device_gets_identity_cookie() {
    let test_app = create_test_app(vec![make_activity("act", 1, 1, RewardMode::Full)]);

    // No cookie, no header: the middleware mints an id and sets the cookie.
    let response = test_app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/activities/act/locations/loc-0/token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("identity cookie set")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with(DEVICE_COOKIE));
}

#[tokio::test]
async fn test_presented_identity_is_echoed_not_replaced() {
    let test_app = create_test_app(vec![make_activity("act", 1, 1, RewardMode::Full)]);

    let response = test_app
        .app
        .clone()
        .oneshot(token_request("act", "loc-0", "dev-known"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // A caller who already holds an id keeps it; no replacement cookie.
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(test_app.state.db.device_known("dev-known"));
}

#[tokio::test]
async fn test_checkin_for_closed_activity_conflicts() {
    let mut activity = make_activity("act", 1, 1, RewardMode::Full);
    activity.is_active = false;
    let test_app = create_test_app(vec![activity]);

    let response = test_app
        .app
        .clone()
        .oneshot(token_request("act", "loc-0", "dev-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "activity_not_eligible");
}
