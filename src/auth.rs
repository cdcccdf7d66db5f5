//! API-key material.
//!
//! A raw key is presented as `Authorization: Bearer <key>`. The server never
//! stores the raw key: lookup goes through a SHA-256 hex digest (constant
//! shape, indexable) and verification through bcrypt against the stored
//! secret hash.

use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the raw token, used for the indexed key lookup.
pub fn lookup_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a presented token against the stored bcrypt hash. A malformed
/// stored hash counts as a failed verification.
pub fn verify_token(token: &str, secret_hash: &str) -> bool {
    bcrypt::verify(token, secret_hash).unwrap_or(false)
}

/// Mint a new API key. Returns `(raw_token, lookup_hash, secret_hash)`; the
/// raw token is shown to the caller once and never persisted.
pub fn mint_key() -> Result<(String, String, String), bcrypt::BcryptError> {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill(&mut raw[..]);
    let token = format!(
        "sk_{}",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
    );
    let secret_hash = bcrypt::hash(&token, bcrypt::DEFAULT_COST)?;
    let lookup = lookup_hash(&token);
    Ok((token, lookup, secret_hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_hash_is_stable_hex() {
        let h = lookup_hash("sk_test");
        assert_eq!(h.len(), 64);
        assert_eq!(h, lookup_hash("sk_test"));
        assert_ne!(h, lookup_hash("sk_test2"));
    }

    #[test]
    fn minted_key_round_trips() {
        let (token, lookup, secret) = mint_key().unwrap();
        assert!(token.starts_with("sk_"));
        assert_eq!(lookup, lookup_hash(&token));
        assert!(verify_token(&token, &secret));
        assert!(!verify_token("sk_wrong", &secret));
    }

    #[test]
    fn malformed_stored_hash_fails_closed() {
        assert!(!verify_token("sk_test", "not-a-bcrypt-hash"));
    }
}
