// SPDX-License-Identifier: MIT

//! Booking model: a paid reservation of a tour date.

use serde::{Deserialize, Serialize};

/// Booking document stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// Document ID. Webhook-created bookings reuse the checkout session ID
    /// so duplicate webhook deliveries are idempotent.
    pub id: String,
    /// Tour document ID
    pub tour: String,
    /// User document ID
    pub user: String,
    /// Tour slug, denormalized for per-date booking stats
    pub tour_name: String,
    pub price: f64,
    /// The start date the customer booked (RFC 3339)
    pub tour_date: String,
    #[serde(default = "default_paid")]
    pub paid: bool,
    pub created_at: String,
}

fn default_paid() -> bool {
    true
}
