// SPDX-License-Identifier: MIT

//! Wildtrails: tour-booking backend.
//!
//! This crate provides the REST API for browsing and booking tours,
//! reviews, subscriptions, and payment-webhook-driven booking creation.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod query;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use middleware::ApiRateLimiter;
use services::{EmailClient, OtpClient, StripeClient};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub payments: StripeClient,
    pub email: EmailClient,
    pub otp: OtpClient,
    pub rate_limiter: ApiRateLimiter,
}
