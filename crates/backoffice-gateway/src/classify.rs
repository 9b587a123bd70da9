//! Failure classification for backend responses
//!
//! Decides whether a rejected request is worth one refresh and replay. A 401
//! always is. A 403 is ambiguous: the backend answers 403 both for a genuine
//! permission denial and for some expired or invalid token cases. Only 403s
//! whose message mentions the token are treated as token failures.

/// Message fragments that mark a 403 as a token problem. Matched
/// case-insensitively against the extracted message.
pub const TOKEN_FAILURE_PATTERNS: &[&str] = &["token", "jwt", "expired"];

/// What a failed response means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Access token rejected; refresh and replay once.
    TokenRejected,
    /// Authenticated but not allowed; surface unchanged.
    Forbidden,
    /// Anything else (validation, not found, 5xx); surface unchanged.
    Other,
}

/// Whether a 403 message points at the token rather than the permissions.
pub fn mentions_token(message: &str) -> bool {
    let lower = message.to_lowercase();
    TOKEN_FAILURE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Classify a non-2xx response by status and extracted message.
pub fn classify_status(status: u16, message: &str) -> FailureClass {
    match status {
        401 => FailureClass::TokenRejected,
        403 if mentions_token(message) => FailureClass::TokenRejected,
        403 => FailureClass::Forbidden,
        _ => FailureClass::Other,
    }
}

pub fn is_token_failure(status: u16, message: &str) -> bool {
    classify_status(status, message) == FailureClass::TokenRejected
}
