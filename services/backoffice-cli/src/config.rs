//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! The login password is loaded from the BACKOFFICE_PASSWORD env var or
//! password_file, never stored in the TOML directly to avoid leaking secrets.

use backoffice_auth::{DEFAULT_BASE_URL, DEFAULT_REFRESH_MARGIN_SECS, DEFAULT_TIMEOUT_SECS};
use backoffice_gateway::GatewayConfig;
use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "backoffice.toml";
const DEFAULT_SESSION_PATH: &str = "~/.backoffice/session.json";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub login: LoginConfig,
}

/// Backend API settings
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

/// Where the session file lives
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}

/// Default credentials for `backoffice login`
#[derive(Debug, Default, Deserialize)]
pub struct LoginConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to BACKOFFICE_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_refresh_margin() -> u64 {
    DEFAULT_REFRESH_MARGIN_SECS
}

fn default_session_path() -> PathBuf {
    PathBuf::from(DEFAULT_SESSION_PATH)
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Like [`Config::load`], but a missing file yields the defaults unless
    /// the caller asked for that file explicitly.
    pub fn load_or_default(path: &Path, explicit: bool) -> common::Result<Self> {
        if !explicit && !path.exists() {
            return Self::parse("");
        }
        Self::load(path)
    }

    /// Parse TOML, apply env overlays and validate.
    ///
    /// Password resolution order:
    /// 1. BACKOFFICE_PASSWORD env var
    /// 2. password_file path from config
    pub fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(url) = std::env::var("BACKOFFICE_BASE_URL") {
            config.backend.base_url = url;
        }

        if !config.backend.base_url.starts_with("http://")
            && !config.backend.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.backend.base_url
            )));
        }

        if config.backend.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        config.session.path = expand_home(&config.session.path);

        if let Ok(password) = std::env::var("BACKOFFICE_PASSWORD") {
            config.login.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.login.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            let password = password.trim().to_owned();
            if !password.is_empty() {
                config.login.password = Some(Secret::new(password));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag says whether the path was chosen explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.backend.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.backend.timeout_secs),
            refresh_margin: Duration::from_secs(self.backend.refresh_margin_secs),
        }
    }
}

/// Expand a leading `~/` using HOME. Paths are returned unchanged when HOME
/// is unset.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
