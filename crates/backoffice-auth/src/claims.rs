//! Access token claims and the validity check
//!
//! The client never verifies token signatures; the backend does that on
//! every call. Decoding here only answers "is it worth sending this token, or
//! should we refresh first?". Anything that cannot be decoded is treated as
//! expired so the gateway refreshes instead of sending a token the backend
//! is bound to reject.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::permissions::PermissionSet;

/// Claims carried in the payload segment of an access token.
///
/// Only `exp` is required. The remaining claims describe the session owner
/// and are informational on the client side.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Expiry as unix epoch seconds.
    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<i64>,
    #[serde(default, rename = "empresaId")]
    pub company_id: Option<i64>,
    #[serde(default, rename = "tipoUsuario")]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl TokenClaims {
    /// Seconds until expiry, zero when already past.
    pub fn remaining_secs(&self, now_secs: u64) -> u64 {
        self.exp.saturating_sub(now_secs)
    }
}

/// Decode the payload segment of a compact JWS (`header.payload.signature`).
pub fn decode_claims(token: &str) -> Result<TokenClaims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(Error::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    };

    // Some issuers pad the segments even though JWS forbids it.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not a claims object: {e}")))
}

/// Whether `token` stays valid for more than `margin` from now.
pub fn is_token_valid(token: &str, margin: Duration) -> bool {
    is_token_valid_at(token, now_epoch_secs(), margin)
}

/// Clock-injected form of [`is_token_valid`].
///
/// Valid iff `exp > now + margin`. Tokens that fail to decode are invalid.
pub fn is_token_valid_at(token: &str, now_secs: u64, margin: Duration) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.exp > now_secs.saturating_add(margin.as_secs()),
        Err(_) => false,
    }
}

/// Current unix time in seconds.
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
