// SPDX-License-Identifier: MIT

//! Per-IP rate limiting for the API routes.
//!
//! Uses a keyed governor limiter: each client IP gets its own quota of
//! requests per hour. Behind Cloud Run the client address arrives in
//! `X-Forwarded-For`; the first entry is the originating client.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};

use crate::error::AppError;
use crate::AppState;

/// Keyed per-IP limiter.
pub struct ApiRateLimiter {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
}

impl ApiRateLimiter {
    /// Allow `per_hour` requests per client IP per hour.
    pub fn new(per_hour: u32) -> Self {
        let quota = Quota::per_hour(NonZeroU32::new(per_hour.max(1)).expect("clamped to >= 1"));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Whether this key may proceed right now.
    pub fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }
}

/// Middleware applying the shared limiter, keyed by client IP.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.rate_limiter.check(&client_ip) {
        tracing::warn!(client_ip = %client_ip, "Rate limit exceeded");
        return Err(AppError::TooManyRequests);
    }

    Ok(next.run(request).await)
}
