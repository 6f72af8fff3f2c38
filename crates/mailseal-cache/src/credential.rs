//! Credentials: bearer tokens proving a completed disclosure session.
//!
//! A credential is opaque except for the expiry it declares about itself.
//! The expiry is read from the token's own claims segment without any
//! signature check; it is used only for cache bookkeeping. The key
//! service independently validates the underlying disclosure session, so
//! a forged expiry can at worst cause a spurious cache hit followed by a
//! key-service rejection.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// A cached proof of a completed disclosure session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The opaque bearer token presented to the key service.
    pub bearer: String,

    /// Self-declared expiry, epoch seconds.
    pub expires_at: i64,
}

/// The one claim we read out of a bearer token.
#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

impl Credential {
    /// Construct with a known expiry.
    pub fn new(bearer: impl Into<String>, expires_at: i64) -> Self {
        Self {
            bearer: bearer.into(),
            expires_at,
        }
    }

    /// Construct from a bearer token, reading the expiry from its own
    /// claims segment (second dot-separated part, base64url JSON).
    pub fn from_bearer(bearer: impl Into<String>) -> Result<Self> {
        let bearer = bearer.into();
        let expires_at = decode_expiry(&bearer)?;
        Ok(Self { bearer, expires_at })
    }

    /// Whether the credential has expired at the given time.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Decode the `exp` claim from a dot-separated bearer token.
fn decode_expiry(bearer: &str) -> Result<i64> {
    let payload = bearer
        .split('.')
        .nth(1)
        .ok_or_else(|| CacheError::InvalidCredential("missing claims segment".into()))?;

    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| CacheError::InvalidCredential(format!("claims not base64url: {e}")))?;

    let claims: Claims = serde_json::from_slice(&decoded)
        .map_err(|e| CacheError::InvalidCredential(format!("claims not JSON: {e}")))?;

    Ok(claims.exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_exp(exp: i64) -> String {
        let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
        format!("header.{claims}.signature")
    }

    #[test]
    fn test_expiry_is_read_from_claims() {
        let cred = Credential::from_bearer(token_with_exp(1736870400)).unwrap();
        assert_eq!(cred.expires_at, 1736870400);
    }

    #[test]
    fn test_expired_at_boundary() {
        let cred = Credential::new("tok", 100);
        assert!(cred.is_expired(100));
        assert!(cred.is_expired(101));
        assert!(!cred.is_expired(99));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            Credential::from_bearer("no-claims-here"),
            Err(CacheError::InvalidCredential(_))
        ));
        assert!(matches!(
            Credential::from_bearer("a.!!!.c"),
            Err(CacheError::InvalidCredential(_))
        ));
    }
}
