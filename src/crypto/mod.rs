//! Random and password primitives shared across the auth subsystem.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::{rngs::OsRng, Rng};
use subtle::ConstantTimeEq;

use crate::model::{Decrypter, Encrypter};

/// Literal stored in place of secret material whenever an entity is
/// serialized for logs or API responses.
pub const REDACTED_MESSAGE: &str = "redacted";

const RANDOM_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate `n` characters drawn uniformly from `[a-z0-9]` using the OS
/// random source.
#[must_use]
pub fn generate_random_string(n: usize) -> String {
    let mut rng = OsRng;
    (0..n)
        .map(|_| {
            let index = rng.gen_range(0..RANDOM_CHARSET.len());
            char::from(RANDOM_CHARSET[index])
        })
        .collect()
}

/// Hash a password with bcrypt at the default cost.
///
/// # Errors
/// Returns an error if bcrypt rejects the input (e.g. over the 72-byte limit).
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

/// Compare a bcrypt hash against a candidate password.
/// The comparison itself is constant-time inside bcrypt.
///
/// # Errors
/// Returns an error if the hash is malformed or the password does not match.
pub fn compare_hash_password(hash: &str, password: &str) -> Result<()> {
    if bcrypt::verify(password, hash)? {
        Ok(())
    } else {
        Err(anyhow!("password does not match"))
    }
}

/// Constant-time byte comparison. Slices of different lengths compare
/// unequal without shortcutting on content.
#[must_use]
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Pass-through crypter for deployments without an external KMS.
/// Secrets stay in plaintext at rest; only meant for local development.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCrypter;

#[async_trait]
impl Encrypter for NoopCrypter {
    async fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(plaintext.to_string())
    }
}

#[async_trait]
impl Decrypter for NoopCrypter {
    async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        Ok(ciphertext.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_string_has_requested_length() {
        assert_eq!(generate_random_string(0).len(), 0);
        assert_eq!(generate_random_string(16).len(), 16);
        assert_eq!(generate_random_string(64).len(), 64);
    }

    #[test]
    fn random_string_uses_allowed_characters_only() {
        let value = generate_random_string(256);
        assert!(
            value
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()),
            "unexpected character in {value}"
        );
    }

    #[test]
    fn random_strings_differ() {
        assert_ne!(generate_random_string(32), generate_random_string(32));
    }

    #[test]
    fn hash_and_compare_password_round_trip() {
        let hash = hash_password("s3cr3t").expect("hash");
        assert!(compare_hash_password(&hash, "s3cr3t").is_ok());
        assert!(compare_hash_password(&hash, "wrong").is_err());
    }

    #[test]
    fn compare_rejects_malformed_hash() {
        assert!(compare_hash_password("not-a-bcrypt-hash", "anything").is_err());
    }

    #[test]
    fn constant_time_equal_basics() {
        assert!(constant_time_equal(b"abc", b"abc"));
        assert!(!constant_time_equal(b"abc", b"abd"));
        assert!(!constant_time_equal(b"abc", b"abcd"));
        assert!(constant_time_equal(b"", b""));
    }

    #[tokio::test]
    async fn noop_crypter_round_trip() {
        let crypter = NoopCrypter;
        let ciphertext = crypter.encrypt("value").await.expect("encrypt");
        assert_eq!(crypter.decrypt(&ciphertext).await.expect("decrypt"), "value");
    }
}
