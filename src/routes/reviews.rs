// SPDX-License-Identifier: MIT

//! Review endpoints. Reviews require a booking, and every write refreshes
//! the tour's rating aggregate.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::db::collections;
use crate::error::{AppError, Result};
use crate::middleware::{require_auth, require_roles, CurrentUser};
use crate::models::{Review, Role, User};
use crate::query::{project_fields, FilterOp, FilterValue, ListQuery};
use crate::routes::{to_json, validate_dto, MEMBERS};
use crate::services::credentials::generate_id;
use crate::AppState;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let member = Router::new()
        .route("/api/v1/reviews", post(create_review))
        .route("/api/v1/tours/{tour_id}/reviews", post(create_tour_review))
        .route_layer(middleware::from_fn(|request, next| {
            require_roles(MEMBERS, request, next)
        }));

    Router::new()
        .route("/api/v1/reviews", get(list_reviews))
        .route("/api/v1/tours/{tour_id}/reviews", get(list_tour_reviews))
        .route(
            "/api/v1/reviews/{review_id}",
            get(get_review).patch(update_review).delete(delete_review),
        )
        .merge(member)
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

// ---- Listing ----

/// GET /api/v1/reviews
async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let query = ListQuery::parse(&params)?;
    run_review_list(&state, query).await
}

/// GET /api/v1/tours/{tour_id}/reviews
async fn list_tour_reviews(
    State(state): State<Arc<AppState>>,
    Path(tour_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let query =
        ListQuery::parse(&params)?.with_filter("tour", FilterOp::Eq, FilterValue::Text(tour_id));
    run_review_list(&state, query).await
}

async fn run_review_list(state: &AppState, query: ListQuery) -> Result<Json<Value>> {
    let reviews: Vec<Review> = state.db.list(collections::REVIEWS, &query).await?;

    let documents: Vec<Value> = reviews
        .iter()
        .map(|review| {
            let value = to_json(review)?;
            Ok(match &query.fields {
                Some(fields) => project_fields(value, fields),
                None => value,
            })
        })
        .collect::<Result<_>>()?;

    Ok(Json(json!({
        "status": "success",
        "results": documents.len(),
        "data": { "reviews": documents }
    })))
}

/// GET /api/v1/reviews/{review_id}
async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<String>,
) -> Result<Json<Value>> {
    let review: Review = state
        .db
        .get_by_id(collections::REVIEWS, &review_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": { "review": to_json(&review)? }
    })))
}

// ---- Writing ----

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, message = "A review cannot be empty"))]
    pub review: String,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: f64,
    pub tour: Option<String>,
}

/// POST /api/v1/reviews
async fn create_review(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let tour_id = body
        .tour
        .clone()
        .ok_or_else(|| AppError::BadRequest("A review must belong to a tour".to_string()))?;
    write_review(&state, &user, tour_id, body).await
}

/// POST /api/v1/tours/{tour_id}/reviews
async fn create_tour_review(
    State(state): State<Arc<AppState>>,
    Path(tour_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    write_review(&state, &user, tour_id, body).await
}

async fn write_review(
    state: &AppState,
    user: &User,
    tour_id: String,
    body: CreateReviewRequest,
) -> Result<(StatusCode, Json<Value>)> {
    validate_dto(&body)?;

    if state.db.get_tour(&tour_id).await?.is_none() {
        return Err(AppError::NotFound("No tour found with that ID".to_string()));
    }
    if !state.db.booking_exists(&user.id, &tour_id).await? {
        return Err(AppError::BadRequest(
            "You can only review a tour you have booked".to_string(),
        ));
    }

    // One review per user per tour.
    let existing = state.db.reviews_for_tour(&tour_id).await?;
    if existing.iter().any(|r| r.user == user.id) {
        return Err(AppError::Duplicate("review".to_string()));
    }

    let review = Review {
        id: generate_id()?,
        tour: tour_id,
        user: user.id.clone(),
        rating: body.rating,
        review: body.review,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state
        .db
        .upsert(collections::REVIEWS, &review.id, &review)
        .await?;
    state.db.recompute_tour_ratings(&review.tour).await?;
    tracing::info!(review_id = %review.id, tour_id = %review.tour, "Review created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": { "review": to_json(&review)? }
        })),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(length(min = 1, message = "A review cannot be empty"))]
    pub review: Option<String>,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: Option<f64>,
}

/// Load a review the caller may modify: its author, or an admin.
async fn load_owned_review(state: &AppState, user: &User, review_id: &str) -> Result<Review> {
    let review: Review = state
        .db
        .get_by_id(collections::REVIEWS, review_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".to_string()))?;

    if review.user != user.id && user.role != Role::Admin {
        return Err(AppError::Forbidden(
            "You can only modify your own reviews".to_string(),
        ));
    }
    Ok(review)
}

/// PATCH /api/v1/reviews/{review_id}
async fn update_review(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<UpdateReviewRequest>,
) -> Result<Json<Value>> {
    validate_dto(&body)?;

    let mut review = load_owned_review(&state, &user, &review_id).await?;
    if let Some(text) = body.review {
        review.review = text;
    }
    if let Some(rating) = body.rating {
        review.rating = rating;
    }
    state
        .db
        .upsert(collections::REVIEWS, &review.id, &review)
        .await?;
    state.db.recompute_tour_ratings(&review.tour).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "review": to_json(&review)? }
    })))
}

/// DELETE /api/v1/reviews/{review_id}
async fn delete_review(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<String>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<StatusCode> {
    let review = load_owned_review(&state, &user, &review_id).await?;
    state.db.delete(collections::REVIEWS, &review.id).await?;
    state.db.recompute_tour_ratings(&review.tour).await?;
    tracing::info!(review_id = %review.id, tour_id = %review.tour, "Review deleted");
    Ok(StatusCode::NO_CONTENT)
}
