//! Room password hashing
//!
//! Hashes are Argon2 PHC strings stored as raw bytes. An empty byte string
//! is reserved for "no password".

use super::error::RoomError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a plaintext room password
///
/// The empty password hashes to empty bytes. Anything else gets a fresh
/// random salt, so two calls with the same input never return the same bytes.
pub fn hash_password(password: &str) -> Result<Vec<u8>, RoomError> {
    if password.is_empty() {
        return Ok(Vec::new());
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| RoomError::internal(format!("password hashing failed: {}", e)))?;

    Ok(hash.to_string().into_bytes())
}

/// Check a candidate against a stored hash
///
/// Empty `hashed` matches only the empty candidate; whether a passwordless
/// room skips this call entirely is up to the caller. Malformed hashes never
/// verify.
pub fn verify_password(hashed: &[u8], candidate: &str) -> bool {
    if hashed.is_empty() {
        return candidate.is_empty();
    }

    let Ok(encoded) = std::str::from_utf8(hashed) else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(encoded) else {
        return false;
    };

    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}
