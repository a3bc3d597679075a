// SPDX-License-Identifier: MIT

//! Password hashing and one-time token generation.
//!
//! Passwords are stored as PBKDF2-HMAC-SHA256 with a per-password random
//! salt. One-time tokens (password reset, email verification) are random
//! bytes handed to the user; only their SHA-256 hex digest is persisted.

use std::num::NonZeroU32;

use ring::rand::{SecureRandom, SystemRandom};
use ring::pbkdf2;
use sha2::{Digest, Sha256};

use crate::error::AppError;

const PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const TOKEN_LEN: usize = 32;
const ID_LEN: usize = 16;

/// Hash a password for storage.
///
/// Format: `pbkdf2-sha256$<iterations>$<salt_hex>$<hash_hex>`.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        PBKDF2_ALG,
        NonZeroU32::new(PBKDF2_ITERATIONS).expect("iterations is non-zero"),
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!(
        "pbkdf2-sha256${}${}${}",
        PBKDF2_ITERATIONS,
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Verify a password against a stored hash. Returns false on any mismatch,
/// including an unparseable stored value.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt_hex), Some(hash_hex), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    if scheme != "pbkdf2-sha256" {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let Some(iterations) = NonZeroU32::new(iterations) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
        return false;
    };

    pbkdf2::verify(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &hash).is_ok()
}

/// Generate a one-time token (hex). The caller stores only [`hash_token`].
pub fn generate_token() -> Result<String, AppError> {
    let mut bytes = [0u8; TOKEN_LEN];
    fill_random(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// SHA-256 hex digest of a one-time token, as persisted.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Generate a random document ID.
pub fn generate_id() -> Result<String, AppError> {
    let mut bytes = [0u8; ID_LEN];
    fill_random(&mut bytes)?;
    Ok(hex::encode(bytes))
}

fn fill_random(buf: &mut [u8]) -> Result<(), AppError> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("pbkdf2-sha256$100000$"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn garbage_stored_hashes_never_verify() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "bcrypt$12$zzzz"));
        assert!(!verify_password("pw", "pbkdf2-sha256$0$aa$bb"));
        assert!(!verify_password("pw", "pbkdf2-sha256$100000$nothex$nothex"));
    }

    #[test]
    fn token_hash_is_stable_and_tokens_are_unique() {
        let token = generate_token().unwrap();
        assert_eq!(token.len(), 64);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(token, generate_token().unwrap());
    }
}
