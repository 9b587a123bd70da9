//! Authenticated gateway for the restaurant back-office API
//!
//! All backend calls go through one [`Gateway`], which attaches the session's
//! bearer token, refreshes it when it is about to expire and replays a
//! request once when the backend rejects the token. Refreshes are
//! single-flight: concurrent requests that need a new token wait on the same
//! refresh call through the [`RefreshCoordinator`].
//!
//! Request lifecycle:
//! 1. Login via [`AuthSession::login`] stores the token pair and user
//! 2. `Gateway::send` attaches a valid token, or refreshes first
//! 3. Backend answers 401, or 403 naming the token → refresh, replay once
//! 4. Refresh impossible or rejected → session cleared, `SessionExpired`
//! 5. Everything else (403 denials, 4xx, 5xx, timeouts) returned unchanged

pub mod classify;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod resource;
pub mod session;

#[cfg(test)]
mod test_support;

pub use classify::{FailureClass, TOKEN_FAILURE_PATTERNS, classify_status, is_token_failure};
pub use coordinator::{HttpRefresher, RefreshCoordinator, RefreshOutcome, Refresher};
pub use error::{Error, LoginFailure, RefreshFailure, Result, StatusError};
pub use gateway::{ApiRequest, ApiResponse, Gateway, GatewayConfig, REQUEST_ID_HEADER};
pub use resource::Resource;
pub use session::{AuthSession, SessionState};
