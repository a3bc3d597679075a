//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// User roles. New accounts start as `Guest` until the email is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    User,
    Admin,
    Guide,
    #[serde(rename = "lead-guide")]
    LeadGuide,
}

/// User profile stored in Firestore.
///
/// The password hash and one-time token fields are persisted with the
/// document but must never leave the server; API responses go through
/// [`User::to_public`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Document ID (random hex)
    pub id: String,
    pub name: String,
    /// Lowercased, unique
    pub email: String,
    #[serde(default = "default_photo")]
    pub photo: String,
    /// E.164 phone number, required for OTP login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    /// PBKDF2-HMAC-SHA256 encoded hash
    pub password_hash: String,
    /// Set whenever the password changes; invalidates older JWTs (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<String>,
    /// SHA-256 hex of the outstanding reset token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_reset_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_reset_expires: Option<String>,
    /// SHA-256 hex of the outstanding email-verification token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verify_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verify_expires: Option<String>,
    /// Soft-delete flag
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: String,
}

fn default_photo() -> String {
    "default.jpg".to_string()
}

fn default_active() -> bool {
    true
}

/// User shape exposed through the API (no credentials or tokens).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub photo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: String,
}

impl User {
    /// Strip credential and token fields for API responses.
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            photo: self.photo.clone(),
            phone: self.phone.clone(),
            role: self.role,
            active: self.active,
            created_at: self.created_at.clone(),
        }
    }

    /// Whether the password was changed after the given JWT issue time.
    pub fn changed_password_after(&self, jwt_iat: i64) -> bool {
        match &self.password_changed_at {
            Some(raw) => chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.timestamp() > jwt_iat)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Whether the user holds one of the given roles.
    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}
