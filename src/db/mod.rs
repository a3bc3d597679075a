//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const TOURS: &str = "tours";
    pub const USERS: &str = "users";
    pub const REVIEWS: &str = "reviews";
    pub const BOOKINGS: &str = "bookings";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}
