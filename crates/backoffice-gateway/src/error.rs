//! Error types for gateway operations

/// A non-2xx response from the backend, kept intact for the caller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("backend returned {status}: {message}")]
pub struct StatusError {
    pub status: u16,
    /// Human-readable message extracted from the body.
    pub message: String,
    /// Raw body text.
    pub body: String,
}

/// Why a token refresh did not produce a new access token.
///
/// Cloned to every request waiting on the same refresh, so all of them see
/// the same failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("no refresh token in session")]
    MissingRefreshToken,

    #[error("refresh token rejected: {0}")]
    Rejected(String),

    #[error("refresh failed: {0}")]
    Failed(String),

    #[error("refresh task ended without a result")]
    Abandoned,
}

/// Login rejection reasons the back office distinguishes for the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginFailure {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account locked, contact an administrator")]
    AccountLocked,

    #[error("account disabled")]
    AccountDisabled,

    #[error("{0}")]
    Other(String),
}

impl LoginFailure {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => LoginFailure::InvalidCredentials,
            423 => LoginFailure::AccountLocked,
            403 => LoginFailure::AccountDisabled,
            _ => LoginFailure::Other(message),
        }
    }
}

/// Errors surfaced by the gateway.
///
/// `NoSession` and `SessionExpired` are the only errors the gateway makes up
/// itself; everything else is the backend's or the transport's answer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable session and none could be obtained.
    #[error("not signed in: {0}")]
    NoSession(RefreshFailure),

    /// The session ended (refresh impossible or rejected) and was cleared.
    #[error("session expired: {0}")]
    SessionExpired(RefreshFailure),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session store error: {0}")]
    Store(String),

    #[error("login failed: {0}")]
    Login(LoginFailure),
}

impl Error {
    /// Whether the caller must sign in again.
    pub fn is_terminal_auth(&self) -> bool {
        matches!(self, Error::NoSession(_) | Error::SessionExpired(_))
    }

    /// HTTP status of a backend rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status(e) => Some(e.status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_builder() {
            Error::InvalidRequest(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}

impl From<backoffice_auth::Error> for Error {
    fn from(e: backoffice_auth::Error) -> Self {
        use backoffice_auth::Error as Auth;
        match e {
            Auth::Http(msg) => Error::Transport(msg),
            Auth::Timeout(msg) => Error::Timeout(msg),
            Auth::Rejected { status, message } => Error::Status(StatusError {
                status,
                body: message.clone(),
                message,
            }),
            Auth::InvalidResponse(msg) | Auth::MalformedToken(msg) => Error::Decode(msg),
            Auth::SessionParse(msg) | Auth::Io(msg) => Error::Store(msg),
        }
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
