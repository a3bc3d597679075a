// SPDX-License-Identifier: MIT

//! Booking endpoints: public availability, member checkout, the payment
//! webhook that records paid bookings, and staff-side CRUD.
//!
//! Bookings created by the webhook reuse the checkout session ID as their
//! document ID, so redelivered events are no-ops.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::db::collections;
use crate::error::{AppError, Result};
use crate::middleware::{require_auth, require_roles, CurrentUser};
use crate::models::Booking;
use crate::query::{project_fields, FilterOp, FilterValue, ListQuery};
use crate::routes::{to_json, validate_dto, MEMBERS, STAFF};
use crate::services::credentials::generate_id;
use crate::services::payments::{CompletedSession, WebhookEvent};
use crate::AppState;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let member = Router::new()
        .route(
            "/api/v1/bookings/checkout-session/{tour_id}",
            get(checkout_session),
        )
        .route_layer(middleware::from_fn(|request, next| {
            require_roles(MEMBERS, request, next)
        }))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let staff = Router::new()
        .route("/api/v1/bookings", get(list_bookings).post(create_booking))
        .route(
            "/api/v1/bookings/{booking_id}",
            get(get_booking).patch(update_booking).delete(delete_booking),
        )
        .route("/api/v1/tours/{tour_id}/bookings", get(list_tour_bookings))
        .route("/api/v1/users/{user_id}/bookings", get(list_user_bookings))
        .route_layer(middleware::from_fn(|request, next| {
            require_roles(STAFF, request, next)
        }))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/api/v1/bookings/info/{slug}", get(booking_info))
        .merge(member)
        .merge(staff)
}

/// The payment webhook: mounted outside `/api/v1` and with no session auth.
/// The request proves itself with its signature.
pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/payments", post(payments_webhook))
}

// ---- Public availability ----

/// GET /api/v1/bookings/info/{slug} — remaining capacity per start date,
/// recounted from the bookings themselves.
async fn booking_info(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Value>> {
    let tour = state
        .db
        .find_tour_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that name".to_string()))?;

    let bookings = state.db.bookings_for_tour_name(&slug).await?;
    let mut counts = vec![0u32; tour.booked_slots.len()];
    for booking in &bookings {
        if let Some(index) = tour.slot_index_for_date(&booking.tour_date) {
            counts[index] += 1;
        }
    }

    let availability: Vec<Value> = tour
        .booked_slots
        .iter()
        .zip(&counts)
        .map(|(slot, &participants)| {
            json!({
                "start_date": slot.start_date,
                "participants": participants,
                "spots_left": tour.max_group_size.saturating_sub(participants),
                "sold_out": participants >= tour.max_group_size,
            })
        })
        .collect();

    Ok(Json(json!({
        "status": "success",
        "data": {
            "tour": to_json(&tour)?,
            "availability": availability
        }
    })))
}

// ---- Member checkout ----

/// GET /api/v1/bookings/checkout-session/{tour_id}?date=...
///
/// Availability is checked here for a friendly error, and again inside the
/// webhook's transactional write, which is the one that counts.
async fn checkout_session(
    State(state): State<Arc<AppState>>,
    Path(tour_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Value>> {
    let date = params.get("date").ok_or_else(|| {
        AppError::BadRequest("Please provide a start date for the booking".to_string())
    })?;

    let tour = state
        .db
        .get_tour(&tour_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that ID".to_string()))?;

    let slot = tour.slot_index_for_date(date).ok_or_else(|| {
        AppError::BadRequest("Please book a tour on one of the scheduled dates".to_string())
    })?;
    if !tour.slot_has_capacity(slot) {
        return Err(AppError::BadRequest(
            "No slots available for this start date. Please try another date".to_string(),
        ));
    }

    let session = state
        .payments
        .create_checkout_session(
            &tour,
            &user,
            date,
            &state.config.frontend_url,
            &state.config.public_url,
        )
        .await?;
    tracing::info!(tour_id = %tour.id, session_id = %session.id, "Checkout session created");

    Ok(Json(json!({
        "status": "success",
        "session": to_json(&session)?
    })))
}

// ---- Payment webhook ----

/// POST /webhook/payments
///
/// The body must stay raw bytes: the signature covers the exact payload.
async fn payments_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    state.payments.verify_webhook_signature(&body, signature)?;

    // After the signature checks out, always acknowledge: a redelivery
    // would fail the same way.
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable webhook payload");
            return Ok(Json(json!({ "received": true })));
        }
    };

    if event.event_type == "checkout.session.completed" {
        if let Err(e) = record_checkout(&state, event.data.object).await {
            tracing::error!(error = %e, "Failed to record checkout");
        }
    } else {
        tracing::debug!(event_type = %event.event_type, "Ignoring webhook event");
    }

    Ok(Json(json!({ "received": true })))
}

/// Turn a completed checkout session into a paid booking.
async fn record_checkout(state: &AppState, session: CompletedSession) -> Result<()> {
    let tour_id = session
        .client_reference_id
        .ok_or_else(|| AppError::BadRequest("Checkout session has no tour reference".to_string()))?;
    let email = session
        .customer_email
        .ok_or_else(|| AppError::BadRequest("Checkout session has no customer email".to_string()))?;
    let tour_date = session
        .metadata
        .get("tour_date")
        .cloned()
        .ok_or_else(|| AppError::BadRequest("Checkout session has no tour date".to_string()))?;

    let user = state
        .db
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user with email {}", email)))?;
    let tour = state
        .db
        .get_tour(&tour_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tour {} not found", tour_id)))?;

    let price = session
        .amount_total
        .map(|minor| minor as f64 / 100.0)
        .unwrap_or(tour.price);

    let booking = Booking {
        id: session.id,
        tour: tour.id.clone(),
        user: user.id,
        tour_name: tour.slug.clone(),
        price,
        tour_date,
        paid: true,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state.db.create_booking_atomic(&booking).await?;
    Ok(())
}

// ---- Staff CRUD ----

/// GET /api/v1/bookings
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let query = ListQuery::parse(&params)?;
    run_booking_list(&state, query).await
}

/// GET /api/v1/tours/{tour_id}/bookings
async fn list_tour_bookings(
    State(state): State<Arc<AppState>>,
    Path(tour_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let query =
        ListQuery::parse(&params)?.with_filter("tour", FilterOp::Eq, FilterValue::Text(tour_id));
    run_booking_list(&state, query).await
}

/// GET /api/v1/users/{user_id}/bookings
async fn list_user_bookings(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let query =
        ListQuery::parse(&params)?.with_filter("user", FilterOp::Eq, FilterValue::Text(user_id));
    run_booking_list(&state, query).await
}

async fn run_booking_list(state: &AppState, query: ListQuery) -> Result<Json<Value>> {
    let bookings: Vec<Booking> = state.db.list(collections::BOOKINGS, &query).await?;

    let documents: Vec<Value> = bookings
        .iter()
        .map(|booking| {
            let value = to_json(booking)?;
            Ok(match &query.fields {
                Some(fields) => project_fields(value, fields),
                None => value,
            })
        })
        .collect::<Result<_>>()?;

    Ok(Json(json!({
        "status": "success",
        "results": documents.len(),
        "data": { "bookings": documents }
    })))
}

/// GET /api/v1/bookings/{booking_id} — with tour and user summaries.
async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
) -> Result<Json<Value>> {
    let booking: Booking = state
        .db
        .get_by_id(collections::BOOKINGS, &booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No booking found with that ID".to_string()))?;

    let tour = state.db.get_tour(&booking.tour).await?;
    let user = state.db.get_user(&booking.user).await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "booking": to_json(&booking)?,
            "tour": tour.map(|t| json!({"id": t.id, "name": t.name, "slug": t.slug})),
            "user": user.map(|u| json!({"id": u.id, "name": u.name, "email": u.email})),
        }
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, message = "A booking must belong to a tour"))]
    pub tour: String,
    #[validate(length(min = 1, message = "A booking must belong to a user"))]
    pub user: String,
    #[validate(length(min = 1, message = "A booking must have a start date"))]
    pub tour_date: String,
    pub price: Option<f64>,
    pub paid: Option<bool>,
}

/// POST /api/v1/bookings — manual booking (e.g. taken over the phone).
/// Goes through the same transactional slot claim as the webhook.
async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    validate_dto(&body)?;

    let tour = state
        .db
        .get_tour(&body.tour)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that ID".to_string()))?;
    if state.db.get_user(&body.user).await?.is_none() {
        return Err(AppError::NotFound("No user found with that ID".to_string()));
    }

    let booking = Booking {
        id: generate_id()?,
        tour: tour.id.clone(),
        user: body.user,
        tour_name: tour.slug.clone(),
        price: body.price.unwrap_or(tour.price),
        tour_date: body.tour_date,
        paid: body.paid.unwrap_or(true),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state.db.create_booking_atomic(&booking).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": { "booking": to_json(&booking)? }
        })),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBookingRequest {
    pub price: Option<f64>,
    pub paid: Option<bool>,
    pub tour_date: Option<String>,
}

/// PATCH /api/v1/bookings/{booking_id}
///
/// Moving a booking to another date shifts the slot counters too. The two
/// tour writes are not transactional with the booking write; staff edits
/// are rare enough that reconciling via /bookings/info covers drift.
async fn update_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    Json(body): Json<UpdateBookingRequest>,
) -> Result<Json<Value>> {
    validate_dto(&body)?;

    let mut booking: Booking = state
        .db
        .get_by_id(collections::BOOKINGS, &booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No booking found with that ID".to_string()))?;

    if let Some(price) = body.price {
        booking.price = price;
    }
    if let Some(paid) = body.paid {
        booking.paid = paid;
    }
    if let Some(new_date) = body.tour_date {
        let mut tour = state
            .db
            .get_tour(&booking.tour)
            .await?
            .ok_or_else(|| AppError::NotFound("No tour found with that ID".to_string()))?;

        let new_slot = tour.slot_index_for_date(&new_date).ok_or_else(|| {
            AppError::BadRequest("Please book a tour on one of the scheduled dates".to_string())
        })?;
        if !tour.slot_has_capacity(new_slot) {
            return Err(AppError::BadRequest(
                "No slots available for this start date. Please try another date".to_string(),
            ));
        }

        if let Some(old_slot) = tour.slot_index_for_date(&booking.tour_date) {
            tour.release_slot(old_slot);
        }
        tour.book_slot(new_slot);
        state.db.upsert_tour(&tour).await?;
        booking.tour_date = new_date;
    }

    state
        .db
        .upsert(collections::BOOKINGS, &booking.id, &booking)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "booking": to_json(&booking)? }
    })))
}

/// DELETE /api/v1/bookings/{booking_id} — frees the claimed slot.
async fn delete_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
) -> Result<StatusCode> {
    let booking: Booking = state
        .db
        .get_by_id(collections::BOOKINGS, &booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No booking found with that ID".to_string()))?;

    if let Some(mut tour) = state.db.get_tour(&booking.tour).await? {
        if let Some(slot) = tour.slot_index_for_date(&booking.tour_date) {
            tour.release_slot(slot);
            state.db.upsert_tour(&tour).await?;
        }
    }

    state.db.delete(collections::BOOKINGS, &booking_id).await?;
    tracing::info!(booking_id = %booking_id, "Booking deleted");
    Ok(StatusCode::NO_CONTENT)
}
