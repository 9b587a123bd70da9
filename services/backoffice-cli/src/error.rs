//! Service-specific error types

use thiserror::Error;

/// Command and session errors. Argument errors are reported by clap.
///
/// Backend and gateway failures travel as `backoffice_gateway::Error` and are
/// wrapped with context by `anyhow` in main.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("no username given: pass one to `login` or set login.username")]
    MissingUsername,

    #[error("no password available: set BACKOFFICE_PASSWORD or login.password_file")]
    MissingPassword,

    #[error("not signed in, run `backoffice login`")]
    NotSignedIn,
}
