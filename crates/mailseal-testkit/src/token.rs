//! Mock bearer tokens.
//!
//! Shaped like real credentials (three dot-separated segments, base64url
//! JSON claims) so the cache's claim decoding runs against them
//! unchanged. The claims carry the disclosed conjunction, which is what
//! the mock key service derives keys from.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use mailseal_core::Conjunction;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: i64,
    con: Conjunction,
}

/// Mint a bearer token asserting the given conjunction was disclosed.
pub fn mint_bearer(con: &Conjunction, exp: i64) -> String {
    let claims = serde_json::to_vec(&Claims {
        exp,
        con: con.clone(),
    })
    .expect("claims serialize");
    format!("mock.{}.sig", URL_SAFE_NO_PAD.encode(claims))
}

/// Recover the disclosed conjunction and expiry from a mock bearer.
pub fn decode_bearer(bearer: &str) -> Option<(Conjunction, i64)> {
    let payload = bearer.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Claims = serde_json::from_slice(&decoded).ok()?;
    Some((claims.con, claims.exp))
}
