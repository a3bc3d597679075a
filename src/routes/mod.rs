// SPDX-License-Identifier: MIT

//! HTTP route handlers.

pub mod bookings;
pub mod reviews;
pub mod subs;
pub mod tours;
pub mod users;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method, Uri};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::error::AppError;
use crate::middleware::rate_limit::rate_limit;
use crate::models::Role;
use crate::AppState;

/// JSON bodies on the API surface are small; cap them well below any
/// framework default.
const BODY_LIMIT_BYTES: usize = 10 * 1024;

/// Roles allowed to manage the catalogue.
pub(crate) const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide];
/// Roles allowed to see operational rollups like the monthly plan.
pub(crate) const GUIDES_AND_STAFF: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];
pub(crate) const ADMIN_ONLY: &[Role] = &[Role::Admin];
/// Verified customers.
pub(crate) const MEMBERS: &[Role] = &[Role::User];

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
}

/// Health check response
async fn health_check() -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
    })
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Can't find {} on this server", uri.path()))
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer - allow requests from frontend URL and localhost (for dev)
    let frontend_url = state.config.frontend_url.clone();
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _request_parts: &axum::http::request::Parts| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str == frontend_url
                    || origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Versioned API surface: per-client rate limited and body-capped.
    // Each resource module wires its own auth and role layers.
    let api_routes = Router::new()
        .merge(tours::routes(state.clone()))
        .merge(users::routes(state.clone()))
        .merge(reviews::routes(state.clone()))
        .merge(bookings::routes(state.clone()))
        .merge(subs::routes(state.clone()))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    // The payment webhook sits outside the rate-limited API surface: it is
    // signature-verified instead, and its payloads exceed the API body cap.
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .merge(bookings::webhook_routes());

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(
            crate::middleware::security::add_security_headers,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Run `validator` checks on a request body and surface failures as a 400.
pub(crate) fn validate_dto<T: validator::Validate>(dto: &T) -> Result<(), AppError> {
    dto.validate().map_err(|errors| {
        let mut messages: Vec<String> = Vec::new();
        for (field, failures) in errors.field_errors() {
            for failure in failures {
                match &failure.message {
                    Some(message) => messages.push(message.to_string()),
                    None => messages.push(format!("Invalid value for '{}'", field)),
                }
            }
        }
        messages.sort();
        AppError::Validation(messages.join(". "))
    })
}

/// Serialize a value for embedding in a response envelope.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))
}
