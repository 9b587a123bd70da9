//! Backend response envelope
//!
//! Every backend endpoint wraps its payload as
//! `{"status":"SUCCESS","code":200,"message":"...","data":...}`. Error
//! responses use the same shape with `status: "ERROR"` and usually no data.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("SUCCESS")
    }

    /// Unwrap the payload, failing when the backend sent none.
    pub fn into_data(self) -> Result<T> {
        self.data.ok_or_else(|| {
            Error::InvalidResponse(format!("envelope has no data ({})", self.message))
        })
    }
}

/// Parse an envelope body and unwrap its payload.
pub fn unwrap_data<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: ApiEnvelope<T> = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidResponse(format!("unexpected response body: {e}")))?;
    envelope.into_data()
}

/// Best human-readable message in an error body.
///
/// Prefers the envelope `message`, then a string `error` field, then the raw
/// body text.
pub fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(text) = value.get(field).and_then(|v| v.as_str())
                && !text.is_empty()
            {
                return text.to_string();
            }
        }
    }
    body.trim().to_string()
}
