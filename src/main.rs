// SPDX-License-Identifier: MIT

//! Wildtrails API Server
//!
//! Serves the tour catalogue, accounts, reviews, subscriptions, and
//! payment-backed bookings over a versioned REST API.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wildtrails::{
    config::Config,
    db::FirestoreDb,
    middleware::ApiRateLimiter,
    services::{EmailClient, OtpClient, StripeClient},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Wildtrails API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize payment, email, and OTP provider clients
    let payments = StripeClient::new(
        config.stripe_secret_key.clone(),
        config.stripe_webhook_secret.clone(),
    );
    let email = EmailClient::new(config.email_api_key.clone(), config.email_from.clone());
    let otp = OtpClient::new(config.otp_api_key.clone());
    tracing::info!("Provider clients initialized");

    // Per-client rate limiting, keyed on forwarded address
    let rate_limiter = ApiRateLimiter::new(config.rate_limit_per_hour);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        payments,
        email,
        otp,
        rate_limiter,
    });

    // Build router
    let app = wildtrails::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wildtrails=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
