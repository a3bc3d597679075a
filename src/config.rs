//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and cached in memory. In production
//! (Cloud Run) secrets are injected as environment variables by the
//! deployment, so there is a single loading path.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS and checkout redirects
    pub frontend_url: String,
    /// Public base URL of this API (used in emails and webhook redirects)
    pub public_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// "development" or "production"; production sets the Secure cookie flag
    pub environment: String,
    /// Server port
    pub port: u16,
    /// Session lifetime in hours
    pub jwt_ttl_hours: i64,
    /// Sender address for transactional email
    pub email_from: String,
    /// API requests allowed per IP per hour
    pub rate_limit_per_hour: u32,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Payment provider secret API key
    pub stripe_secret_key: String,
    /// Payment webhook signing secret
    pub stripe_webhook_secret: String,
    /// Transactional email provider API key
    pub email_api_key: String,
    /// SMS OTP provider API key
    pub otp_api_key: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// For local development, secrets can be set via a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            jwt_ttl_hours: env::var("JWT_TTL_HOURS")
                .unwrap_or_else(|_| "72".to_string())
                .parse()
                .unwrap_or(72),
            email_from: env::var("EMAIL_FROM")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("EMAIL_FROM"))?,
            rate_limit_per_hour: env::var("RATE_LIMIT_PER_HOUR")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRIPE_SECRET_KEY"))?,
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?,
            email_api_key: env::var("EMAIL_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("EMAIL_API_KEY"))?,
            otp_api_key: env::var("OTP_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("OTP_API_KEY"))?,
        })
    }

    /// Whether we are running in production.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Default config for tests only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            public_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            environment: "development".to_string(),
            port: 8080,
            jwt_ttl_hours: 72,
            email_from: "bookings@wildtrails.test".to_string(),
            rate_limit_per_hour: 100,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_webhook_secret: "whsec_test_123".to_string(),
            email_api_key: "email_test_key".to_string(),
            otp_api_key: "otp_test_key".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("STRIPE_SECRET_KEY", "sk_test_abc");
        env::set_var("STRIPE_WEBHOOK_SECRET", "whsec_abc");
        env::set_var("EMAIL_API_KEY", "email_abc");
        env::set_var("EMAIL_FROM", "hello@wildtrails.test");
        env::set_var("OTP_API_KEY", "otp_abc");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.stripe_secret_key, "sk_test_abc");
        assert_eq!(config.email_from, "hello@wildtrails.test");
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit_per_hour, 100);
        assert!(!config.is_production());
    }
}
