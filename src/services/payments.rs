// SPDX-License-Identifier: MIT

//! Stripe Checkout client and webhook signature verification.
//!
//! Handles:
//! - Creating hosted Checkout sessions for tour bookings
//! - Verifying `Stripe-Signature` headers on webhook deliveries

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::models::{Tour, User};

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between the signature timestamp and now.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    /// None in offline/test mode
    http: Option<reqwest::Client>,
    base_url: String,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            http: Some(reqwest::Client::new()),
            base_url: "https://api.stripe.com/v1".to_string(),
            secret_key,
            webhook_secret,
        }
    }

    /// Create an offline client for testing. Session creation fails;
    /// signature verification works normally.
    pub fn new_mock(webhook_secret: String) -> Self {
        Self {
            http: None,
            base_url: "https://api.stripe.com/v1".to_string(),
            secret_key: "sk_test_offline".to_string(),
            webhook_secret,
        }
    }

    /// Create a hosted Checkout session for one seat on a tour date.
    ///
    /// The tour ID travels as `client_reference_id` and the chosen start
    /// date in the session metadata, so the webhook can create the booking.
    pub async fn create_checkout_session(
        &self,
        tour: &Tour,
        user: &User,
        tour_date: &str,
        frontend_url: &str,
        public_url: &str,
    ) -> Result<CheckoutSession, AppError> {
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| AppError::PaymentApi("Payment client offline".to_string()))?;

        let success_url = format!("{}/my-tours?alert=booking", frontend_url);
        let cancel_url = format!("{}/tour/{}", frontend_url, tour.slug);
        let image_url = format!("{}/img/tours/{}", public_url, tour.image_cover);
        // Stripe amounts are in minor units
        let unit_amount = (tour.price * 100.0).round() as i64;

        let params: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("customer_email", user.email.clone()),
            ("client_reference_id", tour.id.clone()),
            ("metadata[tour_date]", tour_date.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                "usd".to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                format!("{} Tour", tour.name),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                tour.summary.clone(),
            ),
            (
                "line_items[0][price_data][product_data][images][0]",
                image_url,
            ),
        ];

        let response = http
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::PaymentApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::PaymentApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::PaymentApi(format!("JSON parse error: {}", e)))
    }

    /// Verify a webhook payload against its `Stripe-Signature` header.
    pub fn verify_webhook_signature(&self, payload: &[u8], header: &str) -> Result<(), AppError> {
        verify_signature(
            payload,
            header,
            self.webhook_secret.as_bytes(),
            chrono::Utc::now().timestamp(),
        )
    }
}

/// Verify the `t=<ts>,v1=<hex>` scheme: HMAC-SHA256 of `"<ts>.<payload>"`
/// keyed by the webhook secret, with a bounded timestamp skew.
fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &[u8],
    now: i64,
) -> Result<(), AppError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", raw)) => timestamp = raw.parse().ok(),
            Some(("v1", raw)) => {
                if let Ok(bytes) = hex::decode(raw) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::BadRequest("Webhook signature missing timestamp".to_string()))?;

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::BadRequest(
            "Webhook signature timestamp outside tolerance".to_string(),
        ));
    }

    if candidates.is_empty() {
        return Err(AppError::BadRequest(
            "Webhook signature missing v1 entry".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let matched = candidates
        .iter()
        .any(|candidate| candidate.ct_eq(expected.as_slice()).into());

    if matched {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "Webhook signature mismatch".to_string(),
        ))
    }
}

/// Checkout session returned by Stripe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page
    pub url: Option<String>,
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: CompletedSession,
}

/// The checkout session object inside a `checkout.session.completed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    /// Tour ID as supplied at session creation
    pub client_reference_id: Option<String>,
    pub customer_email: Option<String>,
    /// Amount in minor units
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}
