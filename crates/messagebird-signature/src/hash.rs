//! SHA-256 helpers shared by both signature schemes.

use sha2::{Digest, Sha256};

/// Raw 32-byte SHA-256 digest of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Lowercase hex-encoded SHA-256 digest of `data`.
///
/// # Examples
///
/// ```
/// use messagebird_signature::hash::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// ```
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
