// SPDX-License-Identifier: MIT

//! Tour catalogue endpoints: browsing, geospatial queries, rollups, and
//! staff-side CRUD.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{middleware, Json, Router};
use geo::{Distance, Haversine, Point};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::db::collections;
use crate::error::{AppError, Result};
use crate::middleware::{require_auth, require_roles};
use crate::models::tour::slugify;
use crate::models::{BookedSlot, Difficulty, Tour, TourLocation};
use crate::query::{project_fields, FilterOp, FilterValue, ListQuery, SortDir};
use crate::routes::{to_json, validate_dto, GUIDES_AND_STAFF, STAFF};
use crate::services::credentials::generate_id;
use crate::AppState;

const METERS_PER_MILE: f64 = 1609.34;
const METERS_PER_KM: f64 = 1000.0;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/api/v1/tours", get(list_tours))
        .route("/api/v1/tours/top-5-cheap", get(top_five_cheap))
        .route("/api/v1/tours/stats", get(tour_stats))
        .route("/api/v1/tours/assets", get(tour_assets))
        .route(
            "/api/v1/tours/within/{distance}/center/{latlng}/unit/{unit}",
            get(tours_within),
        )
        .route(
            "/api/v1/tours/distances/{latlng}/unit/{unit}",
            get(tour_distances),
        )
        .route("/api/v1/tours/{tour_id}", get(get_tour));

    let staff = Router::new()
        .route("/api/v1/tours", post(create_tour))
        .route(
            "/api/v1/tours/{tour_id}",
            patch(update_tour).delete(delete_tour),
        )
        .route_layer(middleware::from_fn(|request, next| {
            require_roles(STAFF, request, next)
        }))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let plan = Router::new()
        .route("/api/v1/tours/monthly-plan/{year}", get(monthly_plan))
        .route_layer(middleware::from_fn(|request, next| {
            require_roles(GUIDES_AND_STAFF, request, next)
        }))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(staff).merge(plan)
}

// ---- Browsing ----

/// GET /api/v1/tours — filter/sort/paginate the public catalogue.
async fn list_tours(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let query = ListQuery::parse(&params)?;
    run_tour_list(&state, query).await
}

/// GET /api/v1/tours/top-5-cheap — alias preset: best-rated, cheapest first.
async fn top_five_cheap(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let query = ListQuery {
        filters: Vec::new(),
        sort: vec![
            ("ratings_average".to_string(), SortDir::Desc),
            ("price".to_string(), SortDir::Asc),
        ],
        fields: Some(
            ["name", "price", "ratings_average", "summary", "difficulty"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
        ),
        page: 1,
        limit: 5,
    };
    run_tour_list(&state, query).await
}

/// Shared list path: secret tours never appear in public listings.
async fn run_tour_list(state: &AppState, query: ListQuery) -> Result<Json<Value>> {
    let query = query.with_filter("secret_tour", FilterOp::Eq, FilterValue::Bool(false));
    let tours: Vec<Tour> = state.db.list(collections::TOURS, &query).await?;

    let documents: Vec<Value> = tours
        .iter()
        .map(|tour| {
            let value = to_json(tour)?;
            Ok(match &query.fields {
                Some(fields) => project_fields(value, fields),
                None => value,
            })
        })
        .collect::<Result<_>>()?;

    Ok(Json(json!({
        "status": "success",
        "results": documents.len(),
        "data": { "tours": documents }
    })))
}

/// GET /api/v1/tours/{tour_id} — one tour with its reviews embedded.
async fn get_tour(
    State(state): State<Arc<AppState>>,
    Path(tour_id): Path<String>,
) -> Result<Json<Value>> {
    let tour = state
        .db
        .get_tour(&tour_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that ID".to_string()))?;
    let reviews = state.db.reviews_for_tour(&tour_id).await?;

    let mut document = to_json(&tour)?;
    if let Some(object) = document.as_object_mut() {
        object.insert("reviews".to_string(), to_json(&reviews)?);
    }

    Ok(Json(json!({
        "status": "success",
        "data": { "tour": document }
    })))
}

// ---- Geospatial ----

/// GET /api/v1/tours/within/{distance}/center/{latlng}/unit/{unit}
async fn tours_within(
    State(state): State<Arc<AppState>>,
    Path((distance, latlng, unit)): Path<(f64, String, String)>,
) -> Result<Json<Value>> {
    let center = parse_latlng(&latlng)?;
    let radius_meters = distance * meters_per_unit(&unit)?;
    if !(radius_meters > 0.0) {
        return Err(AppError::BadRequest(
            "Distance must be a positive number".to_string(),
        ));
    }

    let tours = fetch_public_tours(&state).await?;
    let matches: Vec<&Tour> = tours
        .iter()
        .filter(|tour| {
            tour.start_location
                .as_ref()
                .map(|location| distance_meters(center, location) <= radius_meters)
                .unwrap_or(false)
        })
        .collect();

    Ok(Json(json!({
        "status": "success",
        "results": matches.len(),
        "data": { "tours": to_json(&matches)? }
    })))
}

/// GET /api/v1/tours/distances/{latlng}/unit/{unit}
async fn tour_distances(
    State(state): State<Arc<AppState>>,
    Path((latlng, unit)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let center = parse_latlng(&latlng)?;
    let per_unit = meters_per_unit(&unit)?;

    let tours = fetch_public_tours(&state).await?;
    let mut distances: Vec<Value> = tours
        .iter()
        .filter_map(|tour| {
            tour.start_location.as_ref().map(|location| {
                let distance = distance_meters(center, location) / per_unit;
                json!({
                    "name": tour.name,
                    "distance": (distance * 1000.0).round() / 1000.0
                })
            })
        })
        .collect();
    distances.sort_by(|a, b| {
        let da = a["distance"].as_f64().unwrap_or(f64::MAX);
        let db = b["distance"].as_f64().unwrap_or(f64::MAX);
        da.total_cmp(&db)
    });

    Ok(Json(json!({
        "status": "success",
        "data": { "distances": distances }
    })))
}

fn parse_latlng(raw: &str) -> Result<Point<f64>> {
    let invalid = || {
        AppError::BadRequest(
            "Please provide latitude and longitude in the format lat,lng".to_string(),
        )
    };
    let (lat, lng) = raw.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(invalid());
    }
    Ok(Point::new(lng, lat))
}

fn meters_per_unit(unit: &str) -> Result<f64> {
    match unit {
        "mi" => Ok(METERS_PER_MILE),
        "km" => Ok(METERS_PER_KM),
        _ => Err(AppError::BadRequest(
            "Unit must be 'mi' or 'km'".to_string(),
        )),
    }
}

fn distance_meters(center: Point<f64>, location: &TourLocation) -> f64 {
    let point = Point::new(location.coordinates[0], location.coordinates[1]);
    Haversine.distance(center, point)
}

// ---- Rollups ----

/// GET /api/v1/tours/stats — per-difficulty aggregates over well-rated tours.
async fn tour_stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let tours = fetch_public_tours(&state).await?;

    #[derive(Default)]
    struct Acc {
        num_tours: u32,
        num_ratings: u64,
        rating_sum: f64,
        price_sum: f64,
        min_price: f64,
        max_price: f64,
    }

    let mut groups: HashMap<&'static str, Acc> = HashMap::new();
    for tour in tours.iter().filter(|t| t.ratings_average >= 4.5) {
        let acc = groups.entry(difficulty_label(tour.difficulty)).or_default();
        if acc.num_tours == 0 {
            acc.min_price = tour.price;
            acc.max_price = tour.price;
        } else {
            acc.min_price = acc.min_price.min(tour.price);
            acc.max_price = acc.max_price.max(tour.price);
        }
        acc.num_tours += 1;
        acc.num_ratings += u64::from(tour.ratings_quantity);
        acc.rating_sum += tour.ratings_average;
        acc.price_sum += tour.price;
    }

    let mut stats: Vec<Value> = groups
        .into_iter()
        .map(|(difficulty, acc)| {
            let n = f64::from(acc.num_tours);
            json!({
                "difficulty": difficulty,
                "num_tours": acc.num_tours,
                "num_ratings": acc.num_ratings,
                "avg_rating": round2(acc.rating_sum / n),
                "avg_price": round2(acc.price_sum / n),
                "min_price": acc.min_price,
                "max_price": acc.max_price,
            })
        })
        .collect();
    stats.sort_by(|a, b| {
        let pa = a["avg_price"].as_f64().unwrap_or(f64::MAX);
        let pb = b["avg_price"].as_f64().unwrap_or(f64::MAX);
        pa.total_cmp(&pb)
    });

    Ok(Json(json!({
        "status": "success",
        "data": { "stats": stats }
    })))
}

/// GET /api/v1/tours/monthly-plan/{year} — tour starts per month, busiest
/// months first.
async fn monthly_plan(
    State(state): State<Arc<AppState>>,
    Path(year): Path<i32>,
) -> Result<Json<Value>> {
    let tours = fetch_public_tours(&state).await?;
    let plan = monthly_plan_rollup(&tours, year);

    Ok(Json(json!({
        "status": "success",
        "results": plan.len(),
        "data": { "plan": plan }
    })))
}

/// Group tour starts within `year` by month, busiest months first.
fn monthly_plan_rollup(tours: &[Tour], year: i32) -> Vec<Value> {
    let mut months: HashMap<u32, Vec<String>> = HashMap::new();
    for tour in tours {
        for date in &tour.start_dates {
            if let Some((date_year, month)) = year_month(date) {
                if date_year == year {
                    months.entry(month).or_default().push(tour.name.clone());
                }
            }
        }
    }

    let mut buckets: Vec<(u32, Vec<String>)> = months.into_iter().collect();
    buckets.sort_by(|(month_a, names_a), (month_b, names_b)| {
        names_b
            .len()
            .cmp(&names_a.len())
            .then_with(|| month_a.cmp(month_b))
    });

    buckets
        .into_iter()
        .map(|(month, names)| {
            json!({
                "month": month_name(month),
                "num_tour_starts": names.len(),
                "tours": names,
            })
        })
        .collect()
}

/// GET /api/v1/tours/assets — scheduled starts and projected income,
/// grouped by difficulty.
async fn tour_assets(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let tours = fetch_public_tours(&state).await?;
    let assets = assets_rollup(&tours);

    Ok(Json(json!({
        "status": "success",
        "data": { "assets": assets }
    })))
}

/// Group scheduled starts and projected income by difficulty, highest
/// income first. Income counts each tour's price once per scheduled start.
fn assets_rollup(tours: &[Tour]) -> Vec<Value> {
    #[derive(Default)]
    struct Acc {
        num_tour_starts: u32,
        total_income: f64,
    }

    let mut groups: HashMap<&'static str, Acc> = HashMap::new();
    for tour in tours {
        let starts = tour.start_dates.len() as u32;
        if starts == 0 {
            continue;
        }
        let acc = groups.entry(difficulty_label(tour.difficulty)).or_default();
        acc.num_tour_starts += starts;
        acc.total_income += tour.price * f64::from(starts);
    }

    let mut assets: Vec<Value> = groups
        .into_iter()
        .map(|(difficulty, acc)| {
            json!({
                "difficulty": difficulty,
                "num_tour_starts": acc.num_tour_starts,
                "total_income": round2(acc.total_income),
            })
        })
        .collect();
    assets.sort_by(|a, b| {
        let ia = a["total_income"].as_f64().unwrap_or(0.0);
        let ib = b["total_income"].as_f64().unwrap_or(0.0);
        ib.total_cmp(&ia)
    });
    assets
}

/// Fetch every non-secret tour for in-memory rollups and geo filtering.
async fn fetch_public_tours(state: &AppState) -> Result<Vec<Tour>> {
    let query =
        ListQuery::default().with_filter("secret_tour", FilterOp::Eq, FilterValue::Bool(false));
    state.db.list(collections::TOURS, &query).await
}

fn difficulty_label(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "EASY",
        Difficulty::Medium => "MEDIUM",
        Difficulty::Difficult => "DIFFICULT",
    }
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "Unknown",
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn year_month(raw: &str) -> Option<(i32, u32)> {
    use chrono::Datelike;
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| (dt.year(), dt.month()))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| (d.year(), d.month()))
                .ok()
        })
}

// ---- Staff CRUD ----

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTourRequest {
    #[validate(length(
        min = 10,
        max = 40,
        message = "A tour name must have between 10 and 40 characters"
    ))]
    pub name: String,
    #[validate(range(min = 1, message = "A tour must last at least one day"))]
    pub duration: u32,
    #[validate(range(min = 1, message = "A tour must have a group size"))]
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    pub price: f64,
    pub price_discount: Option<f64>,
    #[validate(length(min = 1, message = "A tour must have a summary"))]
    pub summary: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "A tour must have a cover image"))]
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub start_dates: Vec<String>,
    #[serde(default)]
    pub secret_tour: bool,
    pub start_location: Option<TourLocation>,
    #[serde(default)]
    pub locations: Vec<TourLocation>,
    #[serde(default)]
    pub guides: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTourRequest {
    #[validate(length(
        min = 10,
        max = 40,
        message = "A tour name must have between 10 and 40 characters"
    ))]
    pub name: Option<String>,
    #[validate(range(min = 1, message = "A tour must last at least one day"))]
    pub duration: Option<u32>,
    #[validate(range(min = 1, message = "A tour must have a group size"))]
    pub max_group_size: Option<u32>,
    pub difficulty: Option<Difficulty>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    #[validate(length(min = 1, message = "A tour must have a summary"))]
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<String>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<TourLocation>,
    pub locations: Option<Vec<TourLocation>>,
    pub guides: Option<Vec<String>>,
}

/// POST /api/v1/tours
async fn create_tour(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTourRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    validate_dto(&body)?;
    check_pricing(body.price, body.price_discount)?;

    let slug = slugify(&body.name);
    if state.db.find_tour_by_slug(&slug).await?.is_some() {
        return Err(AppError::Duplicate("name".to_string()));
    }

    let tour = Tour {
        id: generate_id()?,
        name: body.name,
        slug,
        duration: body.duration,
        max_group_size: body.max_group_size,
        difficulty: body.difficulty,
        ratings_average: 4.5,
        ratings_quantity: 0,
        price: body.price,
        price_discount: body.price_discount,
        summary: body.summary,
        description: body.description,
        image_cover: body.image_cover,
        images: body.images,
        created_at: chrono::Utc::now().to_rfc3339(),
        booked_slots: body
            .start_dates
            .iter()
            .map(|date| BookedSlot {
                start_date: date.clone(),
                participants: 0,
                sold_out: false,
            })
            .collect(),
        start_dates: body.start_dates,
        secret_tour: body.secret_tour,
        start_location: body.start_location,
        locations: body.locations,
        guides: body.guides,
    };
    state.db.upsert_tour(&tour).await?;

    tracing::info!(tour_id = %tour.id, slug = %tour.slug, "Tour created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": { "tour": to_json(&tour)? }
        })),
    ))
}

/// PATCH /api/v1/tours/{tour_id}
async fn update_tour(
    State(state): State<Arc<AppState>>,
    Path(tour_id): Path<String>,
    Json(body): Json<UpdateTourRequest>,
) -> Result<Json<Value>> {
    validate_dto(&body)?;

    let mut tour = state
        .db
        .get_tour(&tour_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that ID".to_string()))?;

    if let Some(name) = body.name {
        let slug = slugify(&name);
        if let Some(existing) = state.db.find_tour_by_slug(&slug).await? {
            if existing.id != tour.id {
                return Err(AppError::Duplicate("name".to_string()));
            }
        }
        tour.name = name;
        tour.slug = slug;
    }
    if let Some(duration) = body.duration {
        tour.duration = duration;
    }
    if let Some(max_group_size) = body.max_group_size {
        tour.max_group_size = max_group_size;
    }
    if let Some(difficulty) = body.difficulty {
        tour.difficulty = difficulty;
    }
    if let Some(price) = body.price {
        tour.price = price;
    }
    if let Some(discount) = body.price_discount {
        tour.price_discount = Some(discount);
    }
    if let Some(summary) = body.summary {
        tour.summary = summary;
    }
    if let Some(description) = body.description {
        tour.description = Some(description);
    }
    if let Some(image_cover) = body.image_cover {
        tour.image_cover = image_cover;
    }
    if let Some(images) = body.images {
        tour.images = images;
    }
    if let Some(secret_tour) = body.secret_tour {
        tour.secret_tour = secret_tour;
    }
    if let Some(start_location) = body.start_location {
        tour.start_location = Some(start_location);
    }
    if let Some(locations) = body.locations {
        tour.locations = locations;
    }
    if let Some(guides) = body.guides {
        tour.guides = guides;
    }
    if let Some(start_dates) = body.start_dates {
        tour.set_start_dates(start_dates);
    }
    check_pricing(tour.price, tour.price_discount)?;

    state.db.upsert_tour(&tour).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "tour": to_json(&tour)? }
    })))
}

/// DELETE /api/v1/tours/{tour_id}
async fn delete_tour(
    State(state): State<Arc<AppState>>,
    Path(tour_id): Path<String>,
) -> Result<StatusCode> {
    if state.db.get_tour(&tour_id).await?.is_none() {
        return Err(AppError::NotFound("No tour found with that ID".to_string()));
    }
    state.db.delete(collections::TOURS, &tour_id).await?;
    tracing::info!(tour_id = %tour_id, "Tour deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn check_pricing(price: f64, discount: Option<f64>) -> Result<()> {
    if !(price > 0.0) {
        return Err(AppError::Validation(
            "A tour price must be a positive number".to_string(),
        ));
    }
    if let Some(discount) = discount {
        if discount >= price || discount < 0.0 {
            return Err(AppError::Validation(
                "Discount price should be below the regular price".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latlng_parsing() {
        let point = parse_latlng("34.111745,-118.113491").unwrap();
        assert_eq!(point.y(), 34.111745);
        assert_eq!(point.x(), -118.113491);

        assert!(parse_latlng("34.111745").is_err());
        assert!(parse_latlng("notanumber,-118").is_err());
        assert!(parse_latlng("91.0,0.0").is_err());
        assert!(parse_latlng("0.0,181.0").is_err());
    }

    #[test]
    fn unit_conversion() {
        assert_eq!(meters_per_unit("mi").unwrap(), METERS_PER_MILE);
        assert_eq!(meters_per_unit("km").unwrap(), 1000.0);
        assert!(meters_per_unit("furlongs").is_err());
    }

    #[test]
    fn pricing_rules() {
        assert!(check_pricing(497.0, None).is_ok());
        assert!(check_pricing(497.0, Some(400.0)).is_ok());
        assert!(check_pricing(0.0, None).is_err());
        assert!(check_pricing(497.0, Some(497.0)).is_err());
        assert!(check_pricing(497.0, Some(-1.0)).is_err());
    }

    #[test]
    fn year_month_handles_both_date_shapes() {
        assert_eq!(year_month("2026-07-14T09:00:00Z"), Some((2026, 7)));
        assert_eq!(year_month("2026-07-14"), Some((2026, 7)));
        assert_eq!(year_month("bogus"), None);
    }

    fn rollup_tour(name: &str, difficulty: Difficulty, price: f64, starts: &[&str]) -> Tour {
        Tour {
            id: name.to_lowercase(),
            name: name.to_string(),
            slug: slugify(name),
            duration: 5,
            max_group_size: 15,
            difficulty,
            ratings_average: 4.5,
            ratings_quantity: 0,
            price,
            price_discount: None,
            summary: String::new(),
            description: None,
            image_cover: "cover.jpg".to_string(),
            images: vec![],
            created_at: "2026-01-01T00:00:00Z".to_string(),
            start_dates: starts.iter().map(|s| s.to_string()).collect(),
            secret_tour: false,
            start_location: None,
            locations: vec![],
            guides: vec![],
            booked_slots: vec![],
        }
    }

    #[test]
    fn monthly_plan_spells_out_month_names_and_orders_by_starts() {
        let tours = vec![
            rollup_tour(
                "Forest Hiker",
                Difficulty::Easy,
                397.0,
                &["2026-07-01T09:00:00Z", "2026-07-20T09:00:00Z", "2025-07-01T09:00:00Z"],
            ),
            rollup_tour(
                "Sea Explorer",
                Difficulty::Medium,
                497.0,
                &["2026-07-05T09:00:00Z", "2026-03-10T09:00:00Z"],
            ),
        ];

        let plan = monthly_plan_rollup(&tours, 2026);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0]["month"], "July");
        assert_eq!(plan[0]["num_tour_starts"], 3);
        assert_eq!(plan[1]["month"], "March");
        assert_eq!(plan[1]["num_tour_starts"], 1);
    }

    #[test]
    fn assets_income_counts_price_once_per_start() {
        let tours = vec![
            rollup_tour(
                "Forest Hiker",
                Difficulty::Easy,
                400.0,
                &["2026-04-01T09:00:00Z", "2026-05-01T09:00:00Z"],
            ),
            rollup_tour("City Stroll", Difficulty::Easy, 100.0, &["2026-06-01T09:00:00Z"]),
            rollup_tour("Snow Adventurer", Difficulty::Difficult, 997.0, &[]),
        ];

        let assets = assets_rollup(&tours);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0]["difficulty"], "EASY");
        assert_eq!(assets[0]["num_tour_starts"], 3);
        assert_eq!(assets[0]["total_income"], 900.0);
    }
}
