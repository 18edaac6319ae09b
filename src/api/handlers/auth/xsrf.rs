//! One-shot login state tokens bound to the process state key.
//!
//! A token is `nonce.timestamp.mac` where the MAC is a keyed SHA-256 over
//! the nonce and timestamp. Tokens expire with the state cookie; a
//! successful callback clears the cookie so a token cannot be replayed.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::crypto;

const NONCE_LENGTH: usize = 16;
// Tolerate small clock drift between the instance that issued the state and
// the one validating the callback.
const FUTURE_LEEWAY_SECS: u64 = 60;

/// Create a fresh state token keyed by `state_key`.
#[must_use]
pub fn generate(state_key: &str) -> String {
    let nonce = crypto::generate_random_string(NONCE_LENGTH);
    let timestamp = now_unix();
    let mac = message_mac(state_key, &nonce, timestamp);
    format!("{nonce}.{timestamp}.{mac}")
}

/// Whether `token` was produced by this process's `state_key` within
/// `lifetime`.
#[must_use]
pub fn validate(token: &str, state_key: &str, lifetime: Duration) -> bool {
    let mut parts = token.splitn(3, '.');
    let (Some(nonce), Some(timestamp), Some(mac)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(timestamp) = timestamp.parse::<u64>() else {
        return false;
    };
    let expected = message_mac(state_key, nonce, timestamp);
    if !crypto::constant_time_equal(mac.as_bytes(), expected.as_bytes()) {
        return false;
    }

    let now = now_unix();
    if timestamp > now + FUTURE_LEEWAY_SECS {
        return false;
    }
    now.saturating_sub(timestamp) <= lifetime.as_secs()
}

fn message_mac(state_key: &str, nonce: &str, timestamp: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(state_key.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIFETIME: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn generated_token_validates_under_the_same_key() {
        let token = generate("state-key");
        assert!(validate(&token, "state-key", LIFETIME));
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let token = generate("state-key");
        assert!(!validate(&token, "another-key", LIFETIME));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(!validate("", "state-key", LIFETIME));
        assert!(!validate("only-one-part", "state-key", LIFETIME));
        assert!(!validate("nonce.not-a-number.mac", "state-key", LIFETIME));
    }

    #[test]
    fn tampered_nonce_invalidates_the_mac() {
        let token = generate("state-key");
        let mut parts: Vec<&str> = token.splitn(3, '.').collect();
        parts[0] = "tampered0nonce00";
        let forged = parts.join(".");
        assert!(!validate(&forged, "state-key", LIFETIME));
    }

    #[test]
    fn expired_token_is_rejected() {
        let nonce = "abcdefghij012345";
        let old = now_unix() - 3600;
        let mac = message_mac("state-key", nonce, old);
        let token = format!("{nonce}.{old}.{mac}");
        assert!(!validate(&token, "state-key", LIFETIME));
        // Still fine under a lifetime that covers the timestamp.
        assert!(validate(&token, "state-key", Duration::from_secs(7200)));
    }

    #[test]
    fn future_timestamp_is_rejected() {
        let nonce = "abcdefghij012345";
        let future = now_unix() + 3600;
        let mac = message_mac("state-key", nonce, future);
        let token = format!("{nonce}.{future}.{mac}");
        assert!(!validate(&token, "state-key", LIFETIME));
    }
}
