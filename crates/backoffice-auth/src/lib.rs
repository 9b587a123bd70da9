//! Back-office authentication library
//!
//! Session primitives shared by the gateway and the CLI: endpoint constants,
//! access token claims, the permission model, the backend response envelope,
//! the login/refresh calls and session persistence. No dependency on the
//! gateway, so it can be tested and used on its own.
//!
//! Session flow:
//! 1. `token::login()` exchanges credentials for an [`AuthResponse`]
//! 2. The pair and user go into a [`SessionStore`] via `store_session()`
//! 3. `claims::is_token_valid()` decides before each call whether the access
//!    token is still usable
//! 4. `token::refresh_token()` rotates both tokens; the pair is written back
//!    with `store_tokens()`

pub mod claims;
pub mod constants;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod permissions;
pub mod token;
pub mod user;

pub use claims::{TokenClaims, decode_claims, is_token_valid, is_token_valid_at};
pub use constants::*;
pub use credentials::{FileSessionStore, MemorySessionStore, SessionData, SessionStore, TokenPair};
pub use envelope::{ApiEnvelope, extract_message, unwrap_data};
pub use error::{Error, Result};
pub use permissions::{Permission, PermissionSet, Role};
pub use token::{AuthResponse, RefreshResponse, login, refresh_token};
pub use user::UserInfo;
