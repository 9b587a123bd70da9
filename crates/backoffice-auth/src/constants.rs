//! Backend endpoint paths and gateway defaults

/// Default API root when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8091/api/v1";

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";
pub const VALIDATE_PATH: &str = "/auth/validate";

/// Endpoints that must never carry a bearer token or enter the refresh flow.
/// Attaching a token to these would make refresh depend on itself.
pub const AUTH_EXEMPT_PATHS: &[&str] = &[LOGIN_PATH, REFRESH_PATH];

/// Seconds before `exp` at which an access token is already treated as
/// expired. Absorbs clock skew and the latency of the request it guards.
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 30;

/// Per-request transport timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Join a base URL and an absolute endpoint path.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Whether `path` names one of the authentication endpoints.
///
/// Matches the paths `endpoint` would join to the same URL: the query string
/// and leading or trailing slashes are ignored.
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path).trim_matches('/');
    AUTH_EXEMPT_PATHS
        .iter()
        .any(|exempt| exempt.trim_matches('/') == path)
}
