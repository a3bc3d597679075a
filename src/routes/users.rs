// SPDX-License-Identifier: MIT

//! Account endpoints: signup, login (password and OTP), password recovery,
//! email verification, self-service profile, and admin user management.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{middleware, Extension, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::db::collections;
use crate::error::{AppError, Result};
use crate::middleware::auth::{
    create_jwt, create_otp_session_jwt, decode_otp_session_jwt, logout_cookie, session_cookie,
};
use crate::middleware::{require_auth, require_roles, CurrentUser};
use crate::models::{Role, User};
use crate::query::{project_fields, ListQuery};
use crate::routes::{to_json, validate_dto, ADMIN_ONLY};
use crate::services::credentials::{
    generate_id, generate_token, hash_password, hash_token, verify_password,
};
use crate::AppState;

const RESET_TOKEN_TTL_MINUTES: i64 = 10;
const VERIFY_TOKEN_TTL_HOURS: i64 = 24;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/api/v1/users/signup", post(signup))
        .route("/api/v1/users/login", post(login))
        .route("/api/v1/users/login-2fa", post(login_2fa))
        .route("/api/v1/users/login-2fa/verify", post(login_2fa_verify))
        .route("/api/v1/users/logout", get(logout))
        .route("/api/v1/users/forgot-password", post(forgot_password))
        .route("/api/v1/users/reset-password/{token}", patch(reset_password))
        .route(
            "/api/v1/users/verify-email/{token}",
            patch(verify_email_complete),
        );

    let me = Router::new()
        .route("/api/v1/users/verify-email", get(verify_email_init))
        .route(
            "/api/v1/users/me",
            get(get_me).patch(update_me).delete(delete_me),
        )
        .route("/api/v1/users/me/password", patch(update_my_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/api/v1/users", get(list_users).post(create_user))
        .route(
            "/api/v1/users/{user_id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route_layer(middleware::from_fn(|request, next| {
            require_roles(ADMIN_ONLY, request, next)
        }))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(me).merge(admin)
}

/// Issue a session JWT and its cookie for a freshly authenticated user.
fn issue_session(state: &AppState, jar: CookieJar, user: &User) -> Result<(CookieJar, String)> {
    let token = create_jwt(
        &user.id,
        &state.config.jwt_signing_key,
        state.config.jwt_ttl_hours,
    )?;
    let cookie = session_cookie(
        token.clone(),
        state.config.jwt_ttl_hours,
        state.config.is_production(),
    );
    Ok((jar.add(cookie), token))
}

fn session_response(token: String, user: &User) -> Result<Json<Value>> {
    Ok(Json(json!({
        "status": "success",
        "token": token,
        "data": { "user": to_json(&user.to_public())? }
    })))
}

// ---- Signup and login ----

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 4, max = 60, message = "A name must have at least 4 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "A password must have at least 8 characters"))]
    pub password: String,
    pub password_confirm: String,
    pub phone: Option<String>,
}

/// POST /api/v1/users/signup
///
/// New accounts start as guests; verifying the email upgrades them.
async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<Value>)> {
    validate_dto(&body)?;
    if body.password != body.password_confirm {
        return Err(AppError::Validation("Passwords are not the same".to_string()));
    }

    let email = body.email.to_lowercase();
    if state.db.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Duplicate("email".to_string()));
    }

    let user = User {
        id: generate_id()?,
        name: body.name,
        email,
        photo: "default.jpg".to_string(),
        phone: body.phone,
        role: Role::Guest,
        password_hash: hash_password(&body.password)?,
        password_changed_at: None,
        password_reset_token: None,
        password_reset_expires: None,
        email_verify_token: None,
        email_verify_expires: None,
        active: true,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state.db.upsert_user(&user).await?;
    tracing::info!(user_id = %user.id, "User signed up");

    // Welcome email is best effort; the account exists either way.
    let welcome_url = format!("{}/me", state.config.frontend_url);
    if let Err(e) = state.email.send_welcome(&user, &welcome_url).await {
        tracing::warn!(user_id = %user.id, error = %e, "Welcome email failed");
    }

    let (jar, token) = issue_session(&state, jar, &user)?;
    let body = session_response(token, &user)?;
    Ok((StatusCode::CREATED, jar, body))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Please provide a password"))]
    pub password: String,
}

/// Check credentials without revealing which half was wrong.
async fn authenticate(state: &AppState, body: &LoginRequest) -> Result<User> {
    let user = state.db.find_user_by_email(&body.email).await?;
    let valid = user
        .as_ref()
        .map(|u| verify_password(&body.password, &u.password_hash))
        .unwrap_or(false);
    match user {
        Some(user) if valid && user.active => Ok(user),
        _ => Err(AppError::Unauthorized(
            "Incorrect email or password".to_string(),
        )),
    }
}

/// POST /api/v1/users/login
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>)> {
    validate_dto(&body)?;
    let user = authenticate(&state, &body).await?;
    let (jar, token) = issue_session(&state, jar, &user)?;
    Ok((jar, session_response(token, &user)?))
}

/// GET /api/v1/users/logout
async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    (jar.add(logout_cookie()), Json(json!({"status": "success"})))
}

// ---- OTP (two-factor) login ----

/// POST /api/v1/users/login-2fa
///
/// First factor: password. On success an OTP goes to the user's phone and
/// the caller gets a short-lived session token to finish with.
async fn login_2fa(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>> {
    validate_dto(&body)?;
    let user = authenticate(&state, &body).await?;

    let phone = user.phone.as_deref().ok_or_else(|| {
        AppError::BadRequest("No phone number on file for two-factor login".to_string())
    })?;

    let otp_session = state.otp.send_otp(phone).await?;
    let session_token =
        create_otp_session_jwt(&user.id, &otp_session, &state.config.jwt_signing_key)?;

    Ok(Json(json!({
        "status": "success",
        "message": "OTP sent to your phone",
        "session_token": session_token
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(length(min = 1, message = "Please provide the session token"))]
    pub session_token: String,
    #[validate(length(min = 4, max = 8, message = "Please provide the OTP"))]
    pub otp: String,
}

/// POST /api/v1/users/login-2fa/verify
async fn login_2fa_verify(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<(CookieJar, Json<Value>)> {
    validate_dto(&body)?;

    let claims = decode_otp_session_jwt(&body.session_token, &state.config.jwt_signing_key)?;

    if !state.otp.verify_otp(&claims.otp_session, &body.otp).await? {
        return Err(AppError::Unauthorized(
            "Incorrect or expired OTP".to_string(),
        ));
    }

    let user = state
        .db
        .get_user(&claims.sub)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| AppError::Unauthorized("This account no longer exists".to_string()))?;

    let (jar, token) = issue_session(&state, jar, &user)?;
    Ok((jar, session_response(token, &user)?))
}

// ---- Password recovery ----

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
}

/// POST /api/v1/users/forgot-password
async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>> {
    validate_dto(&body)?;

    let mut user = state
        .db
        .find_user_by_email(&body.email)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("There is no user with that email address".to_string())
        })?;

    let token = generate_token()?;
    user.password_reset_token = Some(hash_token(&token));
    user.password_reset_expires = Some(
        (chrono::Utc::now() + chrono::Duration::minutes(RESET_TOKEN_TTL_MINUTES)).to_rfc3339(),
    );
    state.db.upsert_user(&user).await?;

    let reset_url = format!(
        "{}/api/v1/users/reset-password/{}",
        state.config.public_url, token
    );
    if let Err(e) = state.email.send_password_reset(&user, &reset_url).await {
        // Undo the token so a later attempt starts clean.
        user.password_reset_token = None;
        user.password_reset_expires = None;
        if let Err(undo) = state.db.upsert_user(&user).await {
            tracing::error!(user_id = %user.id, error = %undo, "Failed to clear reset token");
        }
        return Err(e);
    }

    Ok(Json(json!({
        "status": "success",
        "message": "Token sent to email!"
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "A password must have at least 8 characters"))]
    pub password: String,
    pub password_confirm: String,
}

/// PATCH /api/v1/users/reset-password/{token}
async fn reset_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(token): Path<String>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<(CookieJar, Json<Value>)> {
    validate_dto(&body)?;
    if body.password != body.password_confirm {
        return Err(AppError::Validation("Passwords are not the same".to_string()));
    }

    let expired = || AppError::BadRequest("Token is invalid or has expired".to_string());
    let mut user = state
        .db
        .find_user_by_reset_token(&hash_token(&token))
        .await?
        .ok_or_else(expired)?;

    if !token_still_valid(user.password_reset_expires.as_deref()) {
        return Err(expired());
    }

    user.password_hash = hash_password(&body.password)?;
    user.password_changed_at = Some(chrono::Utc::now().to_rfc3339());
    user.password_reset_token = None;
    user.password_reset_expires = None;
    state.db.upsert_user(&user).await?;
    tracing::info!(user_id = %user.id, "Password reset");

    let (jar, token) = issue_session(&state, jar, &user)?;
    Ok((jar, session_response(token, &user)?))
}

// ---- Email verification ----

/// GET /api/v1/users/verify-email — send a verification link to the
/// signed-in guest.
async fn verify_email_init(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
) -> Result<Json<Value>> {
    if user.role != Role::Guest {
        return Err(AppError::BadRequest(
            "Email is already verified".to_string(),
        ));
    }

    let token = generate_token()?;
    user.email_verify_token = Some(hash_token(&token));
    user.email_verify_expires =
        Some((chrono::Utc::now() + chrono::Duration::hours(VERIFY_TOKEN_TTL_HOURS)).to_rfc3339());
    state.db.upsert_user(&user).await?;

    let verify_url = format!(
        "{}/api/v1/users/verify-email/{}",
        state.config.public_url, token
    );
    if let Err(e) = state.email.send_verify_email(&user, &verify_url).await {
        user.email_verify_token = None;
        user.email_verify_expires = None;
        if let Err(undo) = state.db.upsert_user(&user).await {
            tracing::error!(user_id = %user.id, error = %undo, "Failed to clear verify token");
        }
        return Err(e);
    }

    Ok(Json(json!({
        "status": "success",
        "message": "Verification link sent to your email"
    })))
}

/// PATCH /api/v1/users/verify-email/{token} — upgrade guest to user.
async fn verify_email_complete(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Value>> {
    let expired = || AppError::BadRequest("Token is invalid or has expired".to_string());
    let mut user = state
        .db
        .find_user_by_verify_token(&hash_token(&token))
        .await?
        .ok_or_else(expired)?;

    if !token_still_valid(user.email_verify_expires.as_deref()) {
        return Err(expired());
    }

    if user.role == Role::Guest {
        user.role = Role::User;
    }
    user.email_verify_token = None;
    user.email_verify_expires = None;
    state.db.upsert_user(&user).await?;
    tracing::info!(user_id = %user.id, "Email verified");

    Ok(Json(json!({
        "status": "success",
        "message": "Email verified",
        "data": { "user": to_json(&user.to_public())? }
    })))
}

fn token_still_valid(expires: Option<&str>) -> bool {
    expires
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt > chrono::Utc::now())
        .unwrap_or(false)
}

// ---- Self-service profile ----

/// GET /api/v1/users/me
async fn get_me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Result<Json<Value>> {
    Ok(Json(json!({
        "status": "success",
        "data": { "user": to_json(&user.to_public())? }
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(length(min = 4, max = 60, message = "A name must have at least 4 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    pub photo: Option<String>,
    pub phone: Option<String>,
    // Present only to catch misdirected password changes.
    #[serde(default)]
    pub password: Option<Value>,
    #[serde(default)]
    pub password_confirm: Option<Value>,
}

/// PATCH /api/v1/users/me
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<Value>> {
    if body.password.is_some() || body.password_confirm.is_some() {
        return Err(AppError::BadRequest(
            "This route is not for password updates. Please use /api/v1/users/me/password"
                .to_string(),
        ));
    }
    validate_dto(&body)?;

    if let Some(email) = body.email {
        let email = email.to_lowercase();
        if email != user.email {
            if state.db.find_user_by_email(&email).await?.is_some() {
                return Err(AppError::Duplicate("email".to_string()));
            }
            user.email = email;
        }
    }
    if let Some(name) = body.name {
        user.name = name;
    }
    if let Some(photo) = body.photo {
        user.photo = photo;
    }
    if let Some(phone) = body.phone {
        user.phone = Some(phone);
    }
    state.db.upsert_user(&user).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "user": to_json(&user.to_public())? }
    })))
}

/// DELETE /api/v1/users/me — soft delete; the document stays for bookings.
async fn delete_me(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
) -> Result<StatusCode> {
    user.active = false;
    state.db.upsert_user(&user).await?;
    tracing::info!(user_id = %user.id, "Account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 1, message = "Please provide your current password"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "A password must have at least 8 characters"))]
    pub password: String,
    pub password_confirm: String,
}

/// PATCH /api/v1/users/me/password
async fn update_my_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    Json(body): Json<UpdatePasswordRequest>,
) -> Result<(CookieJar, Json<Value>)> {
    validate_dto(&body)?;
    if body.password != body.password_confirm {
        return Err(AppError::Validation("Passwords are not the same".to_string()));
    }

    if !verify_password(&body.current_password, &user.password_hash) {
        return Err(AppError::Unauthorized(
            "Your current password is wrong".to_string(),
        ));
    }

    user.password_hash = hash_password(&body.password)?;
    user.password_changed_at = Some(chrono::Utc::now().to_rfc3339());
    state.db.upsert_user(&user).await?;
    tracing::info!(user_id = %user.id, "Password changed");

    // Older sessions are now invalid; hand back a fresh one.
    let (jar, token) = issue_session(&state, jar, &user)?;
    Ok((jar, session_response(token, &user)?))
}

// ---- Admin user management ----

/// GET /api/v1/users
async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let query = ListQuery::parse(&params)?;
    let users: Vec<User> = state.db.list(collections::USERS, &query).await?;

    let documents: Vec<Value> = users
        .iter()
        .map(|user| {
            let value = to_json(&user.to_public())?;
            Ok(match &query.fields {
                Some(fields) => project_fields(value, fields),
                None => value,
            })
        })
        .collect::<Result<_>>()?;

    Ok(Json(json!({
        "status": "success",
        "results": documents.len(),
        "data": { "users": documents }
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(length(min = 4, max = 60, message = "A name must have at least 4 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "A password must have at least 8 characters"))]
    pub password: String,
    pub role: Option<Role>,
    pub phone: Option<String>,
}

/// POST /api/v1/users — admin-created accounts skip email verification.
async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AdminCreateUserRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    validate_dto(&body)?;

    let email = body.email.to_lowercase();
    if state.db.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Duplicate("email".to_string()));
    }

    let user = User {
        id: generate_id()?,
        name: body.name,
        email,
        photo: "default.jpg".to_string(),
        phone: body.phone,
        role: body.role.unwrap_or(Role::User),
        password_hash: hash_password(&body.password)?,
        password_changed_at: None,
        password_reset_token: None,
        password_reset_expires: None,
        email_verify_token: None,
        email_verify_expires: None,
        active: true,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state.db.upsert_user(&user).await?;
    tracing::info!(user_id = %user.id, role = ?user.role, "User created by admin");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": { "user": to_json(&user.to_public())? }
        })),
    ))
}

/// GET /api/v1/users/{user_id}
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    let user = state
        .db
        .get_user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No user found with that ID".to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": { "user": to_json(&user.to_public())? }
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdateUserRequest {
    #[validate(length(min = 4, max = 60, message = "A name must have at least 4 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub photo: Option<String>,
    pub phone: Option<String>,
    pub active: Option<bool>,
    #[serde(default)]
    pub password: Option<Value>,
}

/// PATCH /api/v1/users/{user_id}
async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<AdminUpdateUserRequest>,
) -> Result<Json<Value>> {
    if body.password.is_some() {
        return Err(AppError::Forbidden(
            "This route is not for password updates".to_string(),
        ));
    }
    validate_dto(&body)?;

    let mut user = state
        .db
        .get_user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No user found with that ID".to_string()))?;

    if let Some(email) = body.email {
        let email = email.to_lowercase();
        if email != user.email {
            if state.db.find_user_by_email(&email).await?.is_some() {
                return Err(AppError::Duplicate("email".to_string()));
            }
            user.email = email;
        }
    }
    if let Some(name) = body.name {
        user.name = name;
    }
    if let Some(role) = body.role {
        user.role = role;
    }
    if let Some(photo) = body.photo {
        user.photo = photo;
    }
    if let Some(phone) = body.phone {
        user.phone = Some(phone);
    }
    if let Some(active) = body.active {
        user.active = active;
    }
    state.db.upsert_user(&user).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "user": to_json(&user.to_public())? }
    })))
}

/// DELETE /api/v1/users/{user_id} — hard delete, admin only.
async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<StatusCode> {
    if state.db.get_user(&user_id).await?.is_none() {
        return Err(AppError::NotFound("No user found with that ID".to_string()));
    }
    state.db.delete(collections::USERS, &user_id).await?;
    tracing::info!(user_id = %user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
