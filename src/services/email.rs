// SPDX-License-Identifier: MIT

//! Transactional email client (SendGrid-style HTTP API).

use serde_json::json;

use crate::error::AppError;
use crate::models::User;

/// Email provider client.
#[derive(Clone)]
pub struct EmailClient {
    /// None in offline/test mode: sends become no-ops
    http: Option<reqwest::Client>,
    base_url: String,
    api_key: String,
    from: String,
}

impl EmailClient {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            http: Some(reqwest::Client::new()),
            base_url: "https://api.sendgrid.com/v3".to_string(),
            api_key,
            from,
        }
    }

    /// Offline client for testing; all sends succeed without network calls.
    pub fn new_mock() -> Self {
        Self {
            http: None,
            base_url: "https://api.sendgrid.com/v3".to_string(),
            api_key: "offline".to_string(),
            from: "test@wildtrails.test".to_string(),
        }
    }

    /// Welcome email after signup.
    pub async fn send_welcome(&self, user: &User, url: &str) -> Result<(), AppError> {
        let body = format!(
            "Hi {},\n\n\
             Welcome to Wildtrails, we're glad to have you!\n\
             Visit your account page to get started: {}\n",
            first_name(user),
            url
        );
        self.send(&user.email, "Welcome to the Wildtrails family", &body)
            .await
    }

    /// Password reset link, valid for 10 minutes.
    pub async fn send_password_reset(&self, user: &User, url: &str) -> Result<(), AppError> {
        let body = format!(
            "Hi {},\n\n\
             Forgot your password? Submit a new one here: {}\n\
             The link is valid for 10 minutes. If you didn't request a reset,\n\
             just ignore this email.\n",
            first_name(user),
            url
        );
        self.send(
            &user.email,
            "Your password reset token (valid for only 10 minutes)",
            &body,
        )
        .await
    }

    /// Email-address verification link.
    pub async fn send_verify_email(&self, user: &User, url: &str) -> Result<(), AppError> {
        let body = format!(
            "Hi {},\n\n\
             Please confirm your email address: {}\n",
            first_name(user),
            url
        );
        self.send(&user.email, "Please verify your email address", &body)
            .await
    }

    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), AppError> {
        let Some(http) = self.http.as_ref() else {
            tracing::debug!(to, subject, "Email send skipped (offline mode)");
            return Ok(());
        };

        let payload = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": text }],
        });

        let response = http
            .post(format!("{}/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::EmailApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmailApi(format!("HTTP {}: {}", status, body)));
        }

        tracing::info!(to, subject, "Email sent");
        Ok(())
    }
}

fn first_name(user: &User) -> &str {
    user.name.split_whitespace().next().unwrap_or(&user.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(name: &str) -> User {
        User {
            id: "u1".into(),
            name: name.into(),
            email: "test@example.com".into(),
            photo: "default.jpg".into(),
            phone: None,
            role: Role::Guest,
            password_hash: String::new(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            email_verify_token: None,
            email_verify_expires: None,
            active: true,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn first_name_uses_leading_word() {
        assert_eq!(first_name(&user("Alex Kim")), "Alex");
        assert_eq!(first_name(&user("Cher")), "Cher");
    }

    #[tokio::test]
    async fn offline_client_sends_are_no_ops() {
        let client = EmailClient::new_mock();
        let user = user("Alex Kim");
        assert!(client.send_welcome(&user, "http://x/me").await.is_ok());
        assert!(client
            .send_password_reset(&user, "http://x/reset")
            .await
            .is_ok());
    }
}
