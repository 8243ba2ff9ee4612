//! Random state values, PKCE and constant-time comparison using `ring`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, hmac};

/// Bytes of entropy in a generated `state` or PKCE verifier (256 bits).
pub const RANDOM_TOKEN_BYTES: usize = 32;

/// Returns `RANDOM_TOKEN_BYTES` of OS randomness, base64url encoded without padding.
///
/// Panics only if the operating system RNG is unavailable.
pub fn random_token(rng: &SystemRandom) -> String {
    let mut buf = [0u8; RANDOM_TOKEN_BYTES];
    rng.fill(&mut buf).expect("system random number generator failed");
    URL_SAFE_NO_PAD.encode(buf)
}

/// Generate a PKCE code challenge from the given verifier using SHA-256 and base64url (no padding).
pub fn pkce_code_challenge(verifier: &str) -> String {
    let hash = digest::digest(&digest::SHA256, verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}

/// Compares two strings without an early exit on the first differing byte.
///
/// Both sides are MACed under a fresh random key and the tags are checked
/// with `ring`'s constant-time verify, so neither content nor length leaks
/// through timing.
pub fn constant_time_eq(rng: &SystemRandom, a: &str, b: &str) -> bool {
    let key = match hmac::Key::generate(hmac::HMAC_SHA256, rng) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let tag = hmac::sign(&key, a.as_bytes());
    hmac::verify(&key, b.as_bytes(), tag.as_ref()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_challenge_matches_rfc7636_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K1uhbF2Pbj9LfVDq-Tsc1ztM9zk";
        assert_eq!(pkce_code_challenge(verifier), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn constant_time_eq_behaves_like_eq() {
        let rng = SystemRandom::new();
        assert!(constant_time_eq(&rng, "abc", "abc"));
        assert!(!constant_time_eq(&rng, "abc", "abd"));
        assert!(!constant_time_eq(&rng, "abc", "abcd"));
        assert!(!constant_time_eq(&rng, "", "a"));
        assert!(constant_time_eq(&rng, "", ""));
    }

    #[test]
    fn random_token_is_url_safe() {
        let rng = SystemRandom::new();
        let token = random_token(&rng);
        assert_eq!(token.len(), 43);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
