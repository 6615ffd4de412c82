//! API key material and request digests
//!
//! API keys are 32 random bytes rendered as unpadded base64url. Only
//! `sha256(key ‖ pepper)` in hex is stored. Idempotency keys are reduced to a
//! BLAKE3 hex digest before they touch storage.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const API_KEY_BYTES: usize = 32;

/// Fresh plaintext API key from the OS RNG.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Peppered SHA-256 digest of a plaintext key, lower-case hex.
pub fn hash_api_key(plaintext: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.update(pepper.as_bytes());
    to_hex(&hasher.finalize())
}

/// Compare a presented key against a stored digest without leaking timing.
pub fn verify_api_key(plaintext: &str, pepper: &str, stored_hash: &str) -> bool {
    constant_time_eq(hash_api_key(plaintext, pepper).as_bytes(), stored_hash.as_bytes())
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Storage form of a client-supplied `Idempotency-Key`.
pub fn hash_idempotency_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_url_safe_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_hash_matches_known_sha256() {
        // sha256("abc")
        assert_eq!(
            hash_api_key("ab", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pepper_changes_digest() {
        assert_ne!(hash_api_key("key", "p1"), hash_api_key("key", "p2"));
    }

    #[test]
    fn test_verify() {
        let stored = hash_api_key("secret-key", "pepper");
        assert!(verify_api_key("secret-key", "pepper", &stored));
        assert!(!verify_api_key("secret-kez", "pepper", &stored));
        assert!(!verify_api_key("secret-key", "pepper", &stored[..10]));
    }

    #[test]
    fn test_idempotency_digest_is_stable_hex() {
        let digest = hash_idempotency_key("order-42");
        assert_eq!(digest, hash_idempotency_key("order-42"));
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, hash_idempotency_key("order-43"));
    }
}
