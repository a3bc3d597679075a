// SPDX-License-Identifier: MIT

//! Per-client rate limiting on the API surface.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

mod common;

async fn hit_tours(app: axum::Router, forwarded_for: &str) -> StatusCode {
    app.oneshot(
        Request::builder()
            .method("GET")
            .uri("/api/v1/tours?page=0")
            .header("X-Forwarded-For", forwarded_for)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
    .status()
}

#[tokio::test]
async fn test_api_requests_are_limited_per_client() {
    let (app, _state) = common::create_test_app_with_rate_limit(2);

    // The bad query keeps the offline mock database out of the picture;
    // the limiter runs before the handler either way.
    assert_eq!(hit_tours(app.clone(), "203.0.113.9").await, StatusCode::BAD_REQUEST);
    assert_eq!(hit_tours(app.clone(), "203.0.113.9").await, StatusCode::BAD_REQUEST);
    assert_eq!(
        hit_tours(app.clone(), "203.0.113.9").await,
        StatusCode::TOO_MANY_REQUESTS
    );

    // A different client is unaffected.
    assert_eq!(hit_tours(app, "198.51.100.7").await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_is_not_rate_limited() {
    let (app, _state) = common::create_test_app_with_rate_limit(1);

    for _ in 0..3 {
        let status = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/payments")
                    .header("X-Forwarded-For", "203.0.113.9")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status();
        // Missing signature, not rate limiting.
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
