// SPDX-License-Identifier: MIT

//! JWT authentication middleware and session-token helpers.

use crate::error::AppError;
use crate::models::{Role, User};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "wildtrails_token";

/// Session JWT claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user document ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Claims for the short-lived 2FA session token issued between the
/// password check and OTP verification.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OtpSessionClaims {
    pub sub: String,
    /// OTP provider session ID
    pub otp_session: String,
    pub exp: usize,
    pub iat: usize,
}

/// Authenticated user, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Middleware that requires a valid session JWT belonging to a live user.
///
/// The user must still exist, be active, and must not have changed their
/// password after the token was issued.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header {
            Some(h) if h.starts_with("Bearer ") => h[7..].to_string(),
            _ => {
                return Err(AppError::Unauthorized(
                    "Please log in to access this resource".to_string(),
                ))
            }
        }
    };

    let key = DecodingKey::from_secret(&state.config.jwt_signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data =
        decode::<Claims>(&token, &key, &validation).map_err(|_| AppError::InvalidToken)?;

    let user = state
        .db
        .get_user(&token_data.claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

    if !user.active {
        return Err(AppError::Unauthorized(
            "This account has been deactivated".to_string(),
        ));
    }

    if user.changed_password_after(token_data.claims.iat as i64) {
        return Err(AppError::Unauthorized(
            "Password changed recently, please log in again".to_string(),
        ));
    }

    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}

/// Middleware that requires one of `roles` on the authenticated user.
/// Must run after [`require_auth`].
pub async fn require_roles(
    roles: &'static [Role],
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::Unauthorized("Please log in to access this resource".into()))?;

    if !user.0.has_role(roles) {
        return Err(AppError::Forbidden(
            "You don't have permission to access this resource".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

/// Create a session JWT for a user.
pub fn create_jwt(user_id: &str, signing_key: &[u8], ttl_hours: i64) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + (ttl_hours * 3600) as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

/// 2FA session tokens live just long enough to type in an OTP.
const OTP_SESSION_TTL_SECS: usize = 5 * 60;

/// Create the short-lived token binding a 2FA login attempt to an OTP session.
pub fn create_otp_session_jwt(
    user_id: &str,
    otp_session: &str,
    signing_key: &[u8],
) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp() as usize;

    let claims = OtpSessionClaims {
        sub: user_id.to_string(),
        otp_session: otp_session.to_string(),
        iat: now,
        exp: now + OTP_SESSION_TTL_SECS,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

/// Decode a 2FA session token; an expired or invalid one reports the 408
/// the login flow expects.
pub fn decode_otp_session_jwt(
    token: &str,
    signing_key: &[u8],
) -> Result<OtpSessionClaims, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    decode::<OtpSessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::SessionExpired)
}

/// Build the http-only session cookie carrying a JWT.
pub fn session_cookie(token: String, ttl_hours: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .expires(time::OffsetDateTime::now_utc() + time::Duration::hours(ttl_hours))
        .build()
}

/// Build the cookie that overwrites a session on logout.
pub fn logout_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "loggedout"))
        .path("/")
        .http_only(true)
        .expires(time::OffsetDateTime::now_utc() + time::Duration::seconds(10))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test_jwt_key_32_bytes_minimum!!";

    #[test]
    fn session_jwt_round_trip() {
        let token = create_jwt("user123", KEY, 72).unwrap();

        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(KEY),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();

        assert_eq!(decoded.claims.sub, "user123");
        assert!(decoded.claims.exp > decoded.claims.iat);
    }

    #[test]
    fn otp_session_jwt_round_trip() {
        let token = create_otp_session_jwt("user123", "session-abc", KEY).unwrap();
        let claims = decode_otp_session_jwt(&token, KEY).unwrap();
        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.otp_session, "session-abc");
    }

    #[test]
    fn otp_session_jwt_rejects_wrong_key() {
        let token = create_otp_session_jwt("user123", "session-abc", KEY).unwrap();
        let err = decode_otp_session_jwt(&token, b"another_key_that_is_wrong!!!!!").unwrap_err();
        assert!(matches!(err, AppError::SessionExpired));
    }

    #[test]
    fn cookies_are_http_only() {
        let cookie = session_cookie("tok".into(), 72, true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));

        let logout = logout_cookie();
        assert_eq!(logout.value(), "loggedout");
        assert_eq!(logout.http_only(), Some(true));
    }
}
