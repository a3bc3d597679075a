// SPDX-License-Identifier: MIT

//! Subscription plan model.

use serde::{Deserialize, Serialize};

/// Subscription document stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Document ID (random hex)
    pub id: String,
    /// Plan name, unique
    pub name: String,
    /// Length in days (e.g. 364 for a yearly plan)
    pub duration: u32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// User who created the plan
    pub author: String,
    pub created_at: String,
}
