// SPDX-License-Identifier: MIT

//! Middleware modules (authentication, rate limiting, security headers).

pub mod auth;
pub mod rate_limit;
pub mod security;

pub use auth::{require_auth, require_roles, CurrentUser};
pub use rate_limit::ApiRateLimiter;
