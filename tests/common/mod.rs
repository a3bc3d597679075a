// SPDX-License-Identifier: MIT

use std::sync::Arc;

use wildtrails::config::Config;
use wildtrails::db::FirestoreDb;
use wildtrails::middleware::ApiRateLimiter;
use wildtrails::routes::create_router;
use wildtrails::services::{EmailClient, OtpClient, StripeClient};
use wildtrails::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_rate_limit(100)
}

/// Same as [`create_test_app`], with a custom hourly rate limit.
#[allow(dead_code)]
pub fn create_test_app_with_rate_limit(per_hour: u32) -> (axum::Router, Arc<AppState>) {
    let mut config = Config::test_default();
    config.rate_limit_per_hour = per_hour;
    let webhook_secret = config.stripe_webhook_secret.clone();

    let state = Arc::new(AppState {
        db: test_db_offline(),
        payments: StripeClient::new_mock(webhook_secret),
        email: EmailClient::new_mock(),
        otp: OtpClient::new_mock(),
        rate_limiter: ApiRateLimiter::new(config.rate_limit_per_hour),
        config,
    });

    (create_router(state.clone()), state)
}

/// Create a session JWT the way the login handlers do.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    wildtrails::middleware::auth::create_jwt(user_id, signing_key, 72)
        .expect("Failed to create JWT")
}
