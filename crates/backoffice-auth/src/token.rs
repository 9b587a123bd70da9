//! Login and token refresh
//!
//! Both endpoints POST JSON to the backend and answer with the standard
//! envelope. They are called without an Authorization header: login has no
//! session yet, and refresh authenticates with the refresh token in the body.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{LOGIN_PATH, REFRESH_PATH, endpoint};
use crate::credentials::TokenPair;
use crate::envelope::{extract_message, unwrap_data};
use crate::error::{Error, Result};
use crate::user::UserInfo;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Payload of a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds, informational only. Validity is
    /// always decided from the token's own `exp` claim.
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: UserInfo,
}

impl AuthResponse {
    pub fn token_pair(&self) -> TokenPair {
        TokenPair::new(&self.access_token, &self.refresh_token)
    }
}

/// Payload of a successful refresh. The backend rotates both tokens and may
/// include a fresh user snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

impl RefreshResponse {
    pub fn token_pair(&self) -> TokenPair {
        TokenPair::new(&self.access_token, &self.refresh_token)
    }
}

/// Exchange credentials for a session.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse> {
    debug!(username, "logging in");
    post_envelope(
        client,
        &endpoint(base_url, LOGIN_PATH),
        &LoginRequest { username, password },
    )
    .await
}

/// Exchange a refresh token for a new token pair.
pub async fn refresh_token(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
) -> Result<RefreshResponse> {
    debug!("refreshing access token");
    post_envelope(
        client,
        &endpoint(base_url, REFRESH_PATH),
        &RefreshRequest {
            refresh_token: refresh,
        },
    )
    .await
}

async fn post_envelope<B, T>(client: &reqwest::Client, url: &str, body: &B) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client.post(url).json(body).send().await?;

    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: extract_message(&String::from_utf8_lossy(&bytes)),
        });
    }

    unwrap_data(&bytes)
}
