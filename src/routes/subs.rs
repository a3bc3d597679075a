// SPDX-License-Identifier: MIT

//! Subscription endpoints: members can browse plans and propose their own.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::db::collections;
use crate::error::{AppError, Result};
use crate::middleware::{require_auth, require_roles, CurrentUser};
use crate::models::Subscription;
use crate::query::{project_fields, ListQuery};
use crate::routes::{to_json, validate_dto, MEMBERS};
use crate::services::credentials::generate_id;
use crate::AppState;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/subs",
            get(list_subscriptions).post(create_subscription),
        )
        .route_layer(middleware::from_fn(|request, next| {
            require_roles(MEMBERS, request, next)
        }))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

/// GET /api/v1/subs
async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let query = ListQuery::parse(&params)?;
    let subscriptions: Vec<Subscription> =
        state.db.list(collections::SUBSCRIPTIONS, &query).await?;

    let documents: Vec<Value> = subscriptions
        .iter()
        .map(|subscription| {
            let value = to_json(subscription)?;
            Ok(match &query.fields {
                Some(fields) => project_fields(value, fields),
                None => value,
            })
        })
        .collect::<Result<_>>()?;

    Ok(Json(json!({
        "status": "success",
        "results": documents.len(),
        "data": { "subs": documents }
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 1, max = 60, message = "A subscription must have a name"))]
    pub name: String,
    #[validate(range(min = 1, message = "A subscription must last at least one month"))]
    pub duration: u32,
    #[validate(range(min = 0.0, message = "A subscription price cannot be negative"))]
    pub price: f64,
    pub description: Option<String>,
}

/// POST /api/v1/subs
async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    validate_dto(&body)?;

    if state
        .db
        .find_subscription_by_name(&body.name)
        .await?
        .is_some()
    {
        return Err(AppError::Duplicate("name".to_string()));
    }

    let subscription = Subscription {
        id: generate_id()?,
        name: body.name,
        duration: body.duration,
        price: body.price,
        description: body.description,
        author: user.id,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state
        .db
        .upsert(
            collections::SUBSCRIPTIONS,
            &subscription.id,
            &subscription,
        )
        .await?;
    tracing::info!(subscription_id = %subscription.id, "Subscription created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": { "sub": to_json(&subscription)? }
        })),
    ))
}
