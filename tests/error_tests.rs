// SPDX-License-Identifier: MIT

//! Error surface: fallback 404s, operational classification, and the
//! response envelope.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;
use wildtrails::error::AppError;

mod common;

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/elephants")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["error"], "not_found");
    assert!(parsed["details"]
        .as_str()
        .unwrap()
        .contains("/api/v1/elephants"));
}

#[tokio::test]
async fn test_health_check_works() {
    let (app, _state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_security_headers_present() {
    let (app, _state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
}

#[test]
fn test_operational_classification() {
    assert!(AppError::BadRequest("nope".to_string()).is_operational());
    assert!(AppError::NotFound("gone".to_string()).is_operational());
    assert!(AppError::SessionExpired.is_operational());
    assert!(AppError::TooManyRequests.is_operational());
    assert!(!AppError::Database("boom".to_string()).is_operational());
    assert!(!AppError::Internal(anyhow::anyhow!("bug")).is_operational());
}
