// SPDX-License-Identifier: MIT

//! Services module - external providers and credential handling.

pub mod credentials;
pub mod email;
pub mod otp;
pub mod payments;

pub use email::EmailClient;
pub use otp::OtpClient;
pub use payments::StripeClient;
