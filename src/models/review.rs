// SPDX-License-Identifier: MIT

//! Review model.

use serde::{Deserialize, Serialize};

/// Review document stored in Firestore.
///
/// The tour's `ratings_average` / `ratings_quantity` are recomputed from
/// reviews whenever one is created, updated, or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Document ID (random hex)
    pub id: String,
    /// Tour document ID
    pub tour: String,
    /// Author user ID
    pub user: String,
    /// 1.0 through 5.0
    pub rating: f64,
    pub review: String,
    pub created_at: String,
}
