// SPDX-License-Identifier: MIT

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running
//! (FIRESTORE_EMULATOR_HOST set). The emulator provides a clean state
//! for each test run.

use wildtrails::db::collections;
use wildtrails::models::{BookedSlot, Booking, Difficulty, Review, Role, Tour, User};
use wildtrails::query::{FilterOp, FilterValue, ListQuery, SortDir};

mod common;
use common::test_db;

fn unique_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

fn test_tour(id: &str, max_group_size: u32) -> Tour {
    Tour {
        id: id.to_string(),
        name: format!("Integration Tour {}", id),
        slug: format!("integration-tour-{}", id),
        duration: 5,
        max_group_size,
        difficulty: Difficulty::Easy,
        ratings_average: 4.5,
        ratings_quantity: 0,
        price: 497.0,
        price_discount: None,
        summary: "Emulator test tour".to_string(),
        description: None,
        image_cover: "cover.jpg".to_string(),
        images: vec![],
        created_at: chrono::Utc::now().to_rfc3339(),
        start_dates: vec!["2026-04-25T09:00:00Z".to_string()],
        secret_tour: false,
        start_location: None,
        locations: vec![],
        guides: vec![],
        booked_slots: vec![BookedSlot {
            start_date: "2026-04-25T09:00:00Z".to_string(),
            participants: 0,
            sold_out: false,
        }],
    }
}

fn test_user(id: &str, email: &str) -> User {
    User {
        id: id.to_string(),
        name: "Test User".to_string(),
        email: email.to_string(),
        photo: "default.jpg".to_string(),
        phone: None,
        role: Role::User,
        password_hash: "pbkdf2-sha256$100000$00$00".to_string(),
        password_changed_at: None,
        password_reset_token: None,
        password_reset_expires: None,
        email_verify_token: None,
        email_verify_expires: None,
        active: true,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

fn test_booking(id: &str, tour: &Tour, user_id: &str) -> Booking {
    Booking {
        id: id.to_string(),
        tour: tour.id.clone(),
        user: user_id.to_string(),
        tour_name: tour.slug.clone(),
        price: tour.price,
        tour_date: "2026-04-25T09:00:00Z".to_string(),
        paid: true,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[tokio::test]
async fn test_user_round_trip_and_email_lookup() {
    require_emulator!();

    let db = test_db().await;
    let id = unique_id("user");
    let email = format!("{}@example.com", id);

    assert!(db.get_user(&id).await.unwrap().is_none());

    let user = test_user(&id, &email);
    db.upsert_user(&user).await.unwrap();

    let fetched = db.get_user(&id).await.unwrap().expect("user should exist");
    assert_eq!(fetched.email, email);

    // Lookup is case-insensitive on the caller side.
    let by_email = db
        .find_user_by_email(&email.to_uppercase())
        .await
        .unwrap()
        .expect("email lookup should find the user");
    assert_eq!(by_email.id, id);
}

#[tokio::test]
async fn test_list_query_filters_and_sorts() {
    require_emulator!();

    let db = test_db().await;
    let marker = unique_id("batch");

    for (index, price) in [300.0, 100.0, 200.0].iter().enumerate() {
        let mut tour = test_tour(&format!("{}-{}", marker, index), 10);
        tour.price = *price;
        tour.summary = marker.clone();
        db.upsert_tour(&tour).await.unwrap();
    }

    let query = ListQuery {
        filters: vec![],
        sort: vec![("price".to_string(), SortDir::Asc)],
        fields: None,
        page: 1,
        limit: 100,
    }
    .with_filter("summary", FilterOp::Eq, FilterValue::Text(marker.clone()))
    .with_filter("price", FilterOp::Gte, FilterValue::Number(150.0));

    let tours: Vec<Tour> = db.list(collections::TOURS, &query).await.unwrap();
    let prices: Vec<f64> = tours.iter().map(|t| t.price).collect();
    assert_eq!(prices, vec![200.0, 300.0]);
}

#[tokio::test]
async fn test_atomic_booking_claims_capacity() {
    require_emulator!();

    let db = test_db().await;
    let tour_id = unique_id("tour");
    let user_id = unique_id("user");

    let tour = test_tour(&tour_id, 2);
    db.upsert_tour(&tour).await.unwrap();
    db.upsert_user(&test_user(&user_id, &format!("{}@example.com", user_id)))
        .await
        .unwrap();

    // First two bookings fill the only slot.
    for n in 0..2 {
        let booking = test_booking(&format!("{}-b{}", tour_id, n), &tour, &user_id);
        let created = db.create_booking_atomic(&booking).await.unwrap();
        assert!(created);
    }

    let after = db.get_tour(&tour_id).await.unwrap().unwrap();
    assert_eq!(after.booked_slots[0].participants, 2);
    assert!(after.booked_slots[0].sold_out);

    // A third attempt is refused.
    let overflow = test_booking(&format!("{}-b2", tour_id), &tour, &user_id);
    assert!(db.create_booking_atomic(&overflow).await.is_err());

    // Redelivering an existing booking is a no-op.
    let duplicate = test_booking(&format!("{}-b0", tour_id), &tour, &user_id);
    let created = db.create_booking_atomic(&duplicate).await.unwrap();
    assert!(!created);
}

#[tokio::test]
async fn test_concurrent_bookings_cannot_oversell_a_slot() {
    require_emulator!();

    let db = test_db().await;
    let tour_id = unique_id("tour");
    let user_id = unique_id("user");

    let tour = test_tour(&tour_id, 1);
    db.upsert_tour(&tour).await.unwrap();
    db.upsert_user(&test_user(&user_id, &format!("{}@example.com", user_id)))
        .await
        .unwrap();

    // Two checkouts race for the last seat. One transaction commits and
    // the other aborts on the conflicting tour read.
    let first = test_booking(&format!("{}-race0", tour_id), &tour, &user_id);
    let second = test_booking(&format!("{}-race1", tour_id), &tour, &user_id);
    let (r0, r1) = tokio::join!(
        db.create_booking_atomic(&first),
        db.create_booking_atomic(&second)
    );

    let winners = [&r0, &r1]
        .iter()
        .filter(|r| matches!(r, Ok(true)))
        .count();
    assert_eq!(winners, 1, "exactly one claim should land: {:?} {:?}", r0, r1);

    let after = db.get_tour(&tour_id).await.unwrap().unwrap();
    assert_eq!(after.booked_slots[0].participants, 1);
    assert!(after.booked_slots[0].sold_out);
}

#[tokio::test]
async fn test_review_writes_refresh_tour_ratings() {
    require_emulator!();

    let db = test_db().await;
    let tour_id = unique_id("tour");
    db.upsert_tour(&test_tour(&tour_id, 10)).await.unwrap();

    for (n, rating) in [4.0, 5.0].iter().enumerate() {
        let review = Review {
            id: format!("{}-r{}", tour_id, n),
            tour: tour_id.clone(),
            user: format!("{}-u{}", tour_id, n),
            rating: *rating,
            review: "Loved it".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        db.upsert(collections::REVIEWS, &review.id, &review)
            .await
            .unwrap();
    }

    db.recompute_tour_ratings(&tour_id).await.unwrap();

    let tour = db.get_tour(&tour_id).await.unwrap().unwrap();
    assert_eq!(tour.ratings_quantity, 2);
    assert_eq!(tour.ratings_average, 4.5);

    // Deleting every review resets the aggregate to the default.
    db.delete(collections::REVIEWS, &format!("{}-r0", tour_id))
        .await
        .unwrap();
    db.delete(collections::REVIEWS, &format!("{}-r1", tour_id))
        .await
        .unwrap();
    db.recompute_tour_ratings(&tour_id).await.unwrap();

    let tour = db.get_tour(&tour_id).await.unwrap().unwrap();
    assert_eq!(tour.ratings_quantity, 0);
    assert_eq!(tour.ratings_average, 4.5);
}
