//! API Key generation
//!
//! Generates cryptographically secure secrets and key IDs, and hashes secrets
//! for storage.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Result of generating a new API key
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// The full secret (only shown once at creation)
    pub secret: String,
    /// The hashed secret for storage
    pub hash: String,
}

/// Generator for secure API keys
#[derive(Debug, Clone)]
pub struct ApiKeyGenerator {
    /// Prefix for all generated secrets (e.g., "pmp_")
    prefix: String,
    /// Number of random bytes in a secret
    secret_bytes: usize,
    /// Number of random bytes in a key ID
    id_bytes: usize,
}

impl ApiKeyGenerator {
    /// Create a new API key generator
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            secret_bytes: 32,
            id_bytes: 16,
        }
    }

    /// Generate a new secret and its hash
    pub fn generate(&self) -> GeneratedApiKey {
        let secret = format!("{}{}", self.prefix, random_token(self.secret_bytes));
        let hash = Self::hash_key(&secret);

        GeneratedApiKey { secret, hash }
    }

    /// Generate a new key ID, independent of the secret
    pub fn generate_id(&self) -> String {
        random_token(self.id_bytes)
    }

    /// Hash an API key for storage (lowercase hex SHA-256)
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn random_token(bytes: usize) -> String {
    let mut random_bytes = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    URL_SAFE_NO_PAD.encode(&random_bytes)
}

/// Constant-time digest comparison
///
/// Runs over the full length regardless of where the first difference is.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

impl Default for ApiKeyGenerator {
    fn default() -> Self {
        Self::new("pmp_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_key() {
        let generator = ApiKeyGenerator::default();
        let generated = generator.generate();

        assert!(generated.secret.starts_with("pmp_"));
        // 32 bytes base64-encoded = 43 chars, plus prefix
        assert_eq!(generated.secret.len(), "pmp_".len() + 43);
        assert_eq!(generated.hash.len(), 64);
        assert!(generated.hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_custom_prefix() {
        let generator = ApiKeyGenerator::new("acme_");
        assert!(generator.generate().secret.starts_with("acme_"));
    }

    #[test]
    fn test_key_uniqueness() {
        let generator = ApiKeyGenerator::default();
        let mut secrets = HashSet::new();
        let mut ids = HashSet::new();

        for _ in 0..200 {
            assert!(secrets.insert(generator.generate().secret));
            assert!(ids.insert(generator.generate_id()));
        }
    }

    #[test]
    fn test_id_is_valid_key_id() {
        let generator = ApiKeyGenerator::default();
        let id = generator.generate_id();

        assert_eq!(id.len(), 22);
        assert!(crate::domain::api_key::validate_api_key_id(&id).is_ok());
    }

    #[test]
    fn test_hash_known_value() {
        assert_eq!(
            ApiKeyGenerator::hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
