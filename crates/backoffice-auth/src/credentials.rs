//! Session storage for the signed-in user
//!
//! A session is the access/refresh token pair plus the user snapshot. The
//! [`SessionStore`] contract is synchronous: reads are cheap clones of
//! in-memory state and writes persist before returning.
//!
//! Two implementations:
//! - [`MemorySessionStore`] for tests and embedded use
//! - [`FileSessionStore`] which mirrors the state to a JSON file with keys
//!   `accessToken`, `refreshToken` and `user`, written atomically with 0600
//!   permissions

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::user::UserInfo;

/// Access and refresh token issued together. Always stored together.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Persisted session state. Every field is optional so a half-written or
/// legacy file still loads.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

impl SessionData {
    fn set_tokens(&mut self, tokens: TokenPair) {
        self.access_token = Some(tokens.access_token);
        self.refresh_token = Some(tokens.refresh_token);
    }
}

impl std::fmt::Debug for SessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionData")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user", &self.user.as_ref().map(|u| &u.username))
            .finish()
    }
}

/// Read/write/clear contract for session persistence.
///
/// Only explicit login/logout and the refresh coordinator write through this
/// trait; everything else reads.
pub trait SessionStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    fn user(&self) -> Option<UserInfo>;

    /// Replace the whole session (login).
    fn store_session(&self, tokens: TokenPair, user: UserInfo) -> Result<()>;

    /// Replace both tokens in one write (refresh). The user is untouched.
    fn store_tokens(&self, tokens: TokenPair) -> Result<()>;

    fn store_user(&self, user: UserInfo) -> Result<()>;

    /// Drop all session state (logout, terminal auth failure).
    fn clear(&self) -> Result<()>;
}

fn lock(state: &Mutex<SessionData>) -> MutexGuard<'_, SessionData> {
    // A panic while holding the guard cannot leave SessionData half-updated:
    // every write is a whole-field assignment.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: Mutex<SessionData>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(tokens: TokenPair, user: Option<UserInfo>) -> Self {
        let mut data = SessionData::default();
        data.set_tokens(tokens);
        data.user = user;
        Self {
            state: Mutex::new(data),
        }
    }

    /// Copy of the whole state, for assertions and diagnostics.
    pub fn snapshot(&self) -> SessionData {
        lock(&self.state).clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn access_token(&self) -> Option<String> {
        lock(&self.state).access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.state).refresh_token.clone()
    }

    fn user(&self) -> Option<UserInfo> {
        lock(&self.state).user.clone()
    }

    fn store_session(&self, tokens: TokenPair, user: UserInfo) -> Result<()> {
        let mut state = lock(&self.state);
        state.set_tokens(tokens);
        state.user = Some(user);
        Ok(())
    }

    fn store_tokens(&self, tokens: TokenPair) -> Result<()> {
        lock(&self.state).set_tokens(tokens);
        Ok(())
    }

    fn store_user(&self, user: UserInfo) -> Result<()> {
        lock(&self.state).user = Some(user);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *lock(&self.state) = SessionData::default();
        Ok(())
    }
}

/// Session store mirrored to a JSON file.
///
/// The Mutex serializes writers; the in-memory copy is updated first, so a
/// failed disk write never leaves readers with a token pair that differs from
/// what the last writer intended.
pub struct FileSessionStore {
    path: PathBuf,
    state: Mutex<SessionData>,
}

impl FileSessionStore {
    /// Load the session file at `path`.
    ///
    /// A missing file is an empty (signed-out) session; the file is created
    /// on the first write.
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = match fs::read_to_string(&path) {
            Ok(contents) => {
                let data: SessionData = serde_json::from_str(&contents)
                    .map_err(|e| Error::SessionParse(format!("parsing session file: {e}")))?;
                info!(
                    path = %path.display(),
                    signed_in = data.access_token.is_some(),
                    "loaded session"
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "session file not found, starting signed out");
                SessionData::default()
            }
            Err(e) => return Err(Error::Io(format!("reading session file: {e}"))),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut SessionData)) -> Result<()> {
        let mut state = lock(&self.state);
        apply(&mut *state);
        write_atomic(&self.path, &*state)
    }
}

impl SessionStore for FileSessionStore {
    fn access_token(&self) -> Option<String> {
        lock(&self.state).access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.state).refresh_token.clone()
    }

    fn user(&self) -> Option<UserInfo> {
        lock(&self.state).user.clone()
    }

    fn store_session(&self, tokens: TokenPair, user: UserInfo) -> Result<()> {
        self.update(|state| {
            state.set_tokens(tokens);
            state.user = Some(user);
        })
    }

    fn store_tokens(&self, tokens: TokenPair) -> Result<()> {
        self.update(|state| state.set_tokens(tokens))
    }

    fn store_user(&self, user: UserInfo) -> Result<()> {
        self.update(|state| state.user = Some(user))
    }

    fn clear(&self) -> Result<()> {
        let mut state = lock(&self.state);
        *state = SessionData::default();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed session file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing session file: {e}"))),
        }
    }
}

/// Write the session to disk atomically (temp file + rename) with 0600
/// permissions, since the file holds bearer credentials.
fn write_atomic(path: &Path, data: &SessionData) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::Io(format!("creating session directory: {e}")))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}
