// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Generic collection CRUD with list-query features (filter/sort/paginate)
//! - Users (lookup by email and one-time token hashes)
//! - Tours (slug lookup, review-aggregate updates)
//! - Bookings (atomic capacity-checked creation)

use serde::{de::DeserializeOwned, Serialize};

use crate::db::collections;
use crate::error::AppError;
use crate::models::{Booking, Review, Subscription, Tour, User};
use crate::query::{FilterOp, FilterValue, ListQuery, SortDir};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with the emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // With the emulator env var set, use an unauthenticated connection to
        // avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Generic Collection Operations ───────────────────────────

    /// Get a document by ID.
    pub async fn get_by_id<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or overwrite a document.
    pub async fn upsert<T>(&self, collection: &str, id: &str, doc: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a document by ID.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// List documents applying the parsed query features.
    pub async fn list<T>(&self, collection: &str, query: &ListQuery) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        let filters = query.filters.clone();
        let order: Vec<(String, firestore::FirestoreQueryDirection)> = query
            .sort
            .iter()
            .map(|(field, dir)| {
                let direction = match dir {
                    SortDir::Asc => firestore::FirestoreQueryDirection::Ascending,
                    SortDir::Desc => firestore::FirestoreQueryDirection::Descending,
                };
                (field.clone(), direction)
            })
            .collect();

        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| {
                let conditions: Vec<_> = filters
                    .iter()
                    .map(|f| {
                        let field = q.field(&f.field);
                        match (&f.op, &f.value) {
                            (FilterOp::Eq, FilterValue::Number(v)) => field.eq(*v),
                            (FilterOp::Eq, FilterValue::Bool(v)) => field.eq(*v),
                            (FilterOp::Eq, FilterValue::Text(v)) => field.eq(v.clone()),
                            (FilterOp::Gt, FilterValue::Number(v)) => field.greater_than(*v),
                            (FilterOp::Gt, FilterValue::Bool(v)) => field.greater_than(*v),
                            (FilterOp::Gt, FilterValue::Text(v)) => field.greater_than(v.clone()),
                            (FilterOp::Gte, FilterValue::Number(v)) => {
                                field.greater_than_or_equal(*v)
                            }
                            (FilterOp::Gte, FilterValue::Bool(v)) => {
                                field.greater_than_or_equal(*v)
                            }
                            (FilterOp::Gte, FilterValue::Text(v)) => {
                                field.greater_than_or_equal(v.clone())
                            }
                            (FilterOp::Lt, FilterValue::Number(v)) => field.less_than(*v),
                            (FilterOp::Lt, FilterValue::Bool(v)) => field.less_than(*v),
                            (FilterOp::Lt, FilterValue::Text(v)) => field.less_than(v.clone()),
                            (FilterOp::Lte, FilterValue::Number(v)) => {
                                field.less_than_or_equal(*v)
                            }
                            (FilterOp::Lte, FilterValue::Bool(v)) => field.less_than_or_equal(*v),
                            (FilterOp::Lte, FilterValue::Text(v)) => {
                                field.less_than_or_equal(v.clone())
                            }
                        }
                    })
                    .collect();
                q.for_all(conditions)
            })
            .order_by(order)
            .limit(query.limit)
            .offset(query.offset())
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the first document where `field == value`.
    async fn find_one_by_field<T>(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        let field = field.to_string();
        let value = value.to_string();
        let mut results: Vec<T> = self
            .get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| q.for_all([q.field(&field).eq(value.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(results.pop())
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        self.get_by_id(collections::USERS, id).await
    }

    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.upsert(collections::USERS, &user.id, user).await
    }

    /// Look up a user by (lowercased) email.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_one_by_field(collections::USERS, "email", &email.to_lowercase())
            .await
    }

    /// Look up a user by the SHA-256 hash of a password-reset token.
    pub async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, AppError> {
        self.find_one_by_field(collections::USERS, "password_reset_token", token_hash)
            .await
    }

    /// Look up a user by the SHA-256 hash of an email-verification token.
    pub async fn find_user_by_verify_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, AppError> {
        self.find_one_by_field(collections::USERS, "email_verify_token", token_hash)
            .await
    }

    // ─── Tour Operations ─────────────────────────────────────────

    pub async fn get_tour(&self, id: &str) -> Result<Option<Tour>, AppError> {
        self.get_by_id(collections::TOURS, id).await
    }

    pub async fn upsert_tour(&self, tour: &Tour) -> Result<(), AppError> {
        self.upsert(collections::TOURS, &tour.id, tour).await
    }

    pub async fn find_tour_by_slug(&self, slug: &str) -> Result<Option<Tour>, AppError> {
        self.find_one_by_field(collections::TOURS, "slug", slug).await
    }

    /// Recompute a tour's review aggregates from its reviews.
    ///
    /// Called after every review write. The aggregate is derived data, so a
    /// plain read-recompute-write is sufficient; a racing review write just
    /// triggers another recompute with fresher data.
    pub async fn recompute_tour_ratings(&self, tour_id: &str) -> Result<(), AppError> {
        let reviews = self.reviews_for_tour(tour_id).await?;

        let mut tour = match self.get_tour(tour_id).await? {
            Some(tour) => tour,
            None => {
                tracing::warn!(tour_id, "Skipping rating recompute: tour is gone");
                return Ok(());
            }
        };

        let quantity = reviews.len() as u32;
        let average = if quantity == 0 {
            0.0
        } else {
            reviews.iter().map(|r| r.rating).sum::<f64>() / quantity as f64
        };

        tour.set_ratings(quantity, average);
        self.upsert_tour(&tour).await?;

        tracing::debug!(
            tour_id,
            quantity,
            average = tour.ratings_average,
            "Tour ratings recomputed"
        );
        Ok(())
    }

    // ─── Review Operations ───────────────────────────────────────

    pub async fn reviews_for_tour(&self, tour_id: &str) -> Result<Vec<Review>, AppError> {
        let tour_id = tour_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::REVIEWS)
            .filter(move |q| q.for_all([q.field("tour").eq(tour_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Booking Operations ──────────────────────────────────────

    /// Whether the user has any booking for the tour (review precondition).
    pub async fn booking_exists(&self, user_id: &str, tour_id: &str) -> Result<bool, AppError> {
        let user_id = user_id.to_string();
        let tour_id = tour_id.to_string();
        let results: Vec<Booking> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::BOOKINGS)
            .filter(move |q| {
                q.for_all([
                    q.field("user").eq(user_id.clone()),
                    q.field("tour").eq(tour_id.clone()),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(!results.is_empty())
    }

    /// All bookings for a tour slug (per-date availability stats).
    pub async fn bookings_for_tour_name(&self, slug: &str) -> Result<Vec<Booking>, AppError> {
        let slug = slug.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::BOOKINGS)
            .filter(move |q| q.for_all([q.field("tour_name").eq(slug.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Atomically create a booking while claiming a capacity slot.
    ///
    /// Writes the booking and the updated tour slot counters in one
    /// Firestore transaction so the capacity invariant holds under
    /// concurrent checkouts.
    ///
    /// Returns `false` if a booking with this ID already exists (duplicate
    /// webhook delivery), `true` if the booking was created.
    pub async fn create_booking_atomic(&self, booking: &Booking) -> Result<bool, AppError> {
        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Reads go through the transaction so the documents are registered
        // for conflict detection; a concurrent claim aborts the commit.
        let txn_db = self.get_client()?.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        // Idempotency: webhook-created bookings are keyed by session ID.
        let existing: Option<Booking> = txn_db
            .fluent()
            .select()
            .by_id_in(collections::BOOKINGS)
            .obj()
            .one(&booking.id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if existing.is_some() {
            tracing::debug!(
                booking_id = %booking.id,
                "Booking already recorded (idempotent skip)"
            );
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        let tour: Option<Tour> = txn_db
            .fluent()
            .select()
            .by_id_in(collections::TOURS)
            .obj()
            .one(&booking.tour)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let mut tour = match tour {
            Some(tour) => tour,
            None => {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("Tour {} not found", booking.tour)));
            }
        };

        let slot = match tour.slot_index_for_date(&booking.tour_date) {
            Some(slot) => slot,
            None => {
                let _ = transaction.rollback().await;
                return Err(AppError::BadRequest(
                    "Please book a tour on one of the scheduled dates".to_string(),
                ));
            }
        };

        if !tour.slot_has_capacity(slot) {
            let _ = transaction.rollback().await;
            return Err(AppError::BadRequest(
                "No slots available for this start date. Please try another date".to_string(),
            ));
        }

        tour.book_slot(slot);

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::BOOKINGS)
            .document_id(&booking.id)
            .object(booking)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add booking to transaction: {}", e))
            })?;

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::TOURS)
            .document_id(&tour.id)
            .object(&tour)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add tour to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            booking_id = %booking.id,
            tour_id = %booking.tour,
            tour_date = %booking.tour_date,
            "Booking created with slot claim"
        );

        Ok(true)
    }

    // ---- Subscriptions ----

    /// Look up a subscription by its unique name.
    pub async fn find_subscription_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Subscription>, AppError> {
        self.find_one_by_field(collections::SUBSCRIPTIONS, "name", name)
            .await
    }
}
