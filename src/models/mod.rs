// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod booking;
pub mod review;
pub mod subscription;
pub mod tour;
pub mod user;

pub use booking::Booking;
pub use review::Review;
pub use subscription::Subscription;
pub use tour::{BookedSlot, Difficulty, Tour, TourLocation};
pub use user::{PublicUser, Role, User};
