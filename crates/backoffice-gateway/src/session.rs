//! Explicit sign-in flows on top of the gateway
//!
//! Login and logout are the only writers of the session besides the refresh
//! coordinator. Everything here reads the session through the same store the
//! gateway uses, so a refresh triggered by any request is immediately visible.

use backoffice_auth::{
    LOGOUT_PATH, ME_PATH, Permission, SessionStore, UserInfo, VALIDATE_PATH, is_token_valid,
};
use tracing::{debug, info, warn};

use crate::error::{Error, LoginFailure, Result};
use crate::gateway::Gateway;

/// Outcome of the startup session check.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    SignedOut,
    Active(UserInfo),
}

/// Sign-in state and flows for one user session.
#[derive(Clone)]
pub struct AuthSession {
    gateway: Gateway,
}

impl AuthSession {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Sign in and persist the new session.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserInfo> {
        let auth = match backoffice_auth::login(
            self.gateway.client(),
            self.gateway.base_url(),
            username,
            password,
        )
        .await
        {
            Ok(auth) => auth,
            Err(backoffice_auth::Error::Rejected { status, message }) => {
                warn!(username, status, "login rejected");
                return Err(Error::Login(LoginFailure::from_status(status, message)));
            }
            Err(e) => return Err(e.into()),
        };

        self.gateway
            .store()
            .store_session(auth.token_pair(), auth.user.clone())?;
        info!(
            username,
            role = %auth.user.role_name,
            company_id = ?auth.user.company_id,
            "signed in"
        );
        Ok(auth.user)
    }

    /// Sign out. The backend is told when the access token is still usable;
    /// local state is cleared regardless of that call's outcome.
    pub async fn logout(&self) -> Result<()> {
        let store = self.gateway.store();
        if let Some(token) = store.access_token()
            && is_token_valid(&token, self.gateway.refresh_margin())
            && let Err(e) = self.gateway.post_empty(LOGOUT_PATH).await
        {
            debug!(error = %e, "backend logout failed, clearing local session anyway");
        }
        store.clear()?;
        info!("signed out");
        Ok(())
    }

    /// Fetch the current user and refresh the stored snapshot.
    pub async fn current_user(&self) -> Result<UserInfo> {
        let user: UserInfo = self.gateway.get(ME_PATH).await?.data()?;
        self.gateway.store().store_user(user.clone())?;
        Ok(user)
    }

    /// Ask the backend whether the session is valid. Any failure counts as
    /// invalid.
    pub async fn validate(&self) -> bool {
        match self
            .gateway
            .get(VALIDATE_PATH)
            .await
            .and_then(|response| response.data::<bool>())
        {
            Ok(valid) => valid,
            Err(e) => {
                debug!(error = %e, "session validation failed");
                false
            }
        }
    }

    /// Startup check: restore the stored session if it can still be used.
    ///
    /// An expired access token is refreshed; a missing user snapshot is
    /// fetched. A session that cannot be renewed reports `SignedOut`.
    pub async fn check(&self) -> Result<SessionState> {
        let store = self.gateway.store();
        let Some(token) = store.access_token().filter(|t| !t.is_empty()) else {
            return Ok(SessionState::SignedOut);
        };

        if !is_token_valid(&token, self.gateway.refresh_margin())
            && let Err(failure) = self.gateway.coordinator().replace_token(&token).await
        {
            info!(reason = %failure, "stored session could not be renewed");
            return Ok(SessionState::SignedOut);
        }

        if let Some(user) = store.user() {
            return Ok(SessionState::Active(user));
        }

        match self.current_user().await {
            Ok(user) => Ok(SessionState::Active(user)),
            Err(e) if e.is_terminal_auth() => Ok(SessionState::SignedOut),
            Err(e) => Err(e),
        }
    }

    /// Whether a token and user snapshot are stored.
    pub fn is_authenticated(&self) -> bool {
        let store = self.gateway.store();
        store.access_token().is_some() && store.user().is_some()
    }

    pub fn user(&self) -> Option<UserInfo> {
        self.gateway.store().user()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.user().is_some_and(|u| u.has_permission(permission))
    }

    /// Route-style gate, see [`UserInfo::can_access`]. Always false when
    /// signed out.
    pub fn can_access(&self, required: &[Permission]) -> bool {
        self.user().is_some_and(|u| u.can_access(required))
    }
}
