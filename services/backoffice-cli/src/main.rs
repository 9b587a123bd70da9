//! Restaurant back-office command-line client
//!
//! Signs in against the back-office API and runs authenticated requests
//! through the gateway:
//! 1. Resolves configuration (`--config`, CONFIG_PATH, or backoffice.toml)
//! 2. Opens the session file
//! 3. Runs one command; expired access tokens are refreshed transparently

mod config;
mod error;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use backoffice_auth::{FileSessionStore, Role};
use backoffice_gateway::{AuthSession, Gateway, SessionState};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::Error;

/// Back-office API client.
#[derive(Parser, Debug)]
#[command(
    name = "backoffice",
    about = "Restaurant back-office API client",
    arg_required_else_help = true
)]
struct Cli {
    /// Config file (defaults to CONFIG_PATH, then backoffice.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Sign in (password from BACKOFFICE_PASSWORD or login.password_file)
    Login {
        /// Defaults to login.username from the config
        username: Option<String>,
    },
    /// Sign out and remove the local session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Ask the backend whether the session is valid
    Validate,
    /// Restore the stored session, refreshing it if needed
    Check,
    /// GET an API path, e.g. `get /mesas`
    Get { path: String },
    /// Show the role permission table and your permissions
    Permissions,
}

fn open_session(config: &Config) -> Result<AuthSession> {
    let store = FileSessionStore::load(config.session.path.clone()).with_context(|| {
        format!(
            "failed to open session file {}",
            config.session.path.display()
        )
    })?;
    let gateway = Gateway::new(config.gateway_config(), Arc::new(store))
        .context("failed to build HTTP client")?;
    Ok(AuthSession::new(gateway))
}

/// Attach a sign-in hint to errors that mean the session is gone.
fn session_error(e: backoffice_gateway::Error) -> anyhow::Error {
    if e.is_terminal_auth() {
        anyhow::Error::new(e).context(Error::NotSignedIn)
    } else {
        e.into()
    }
}

fn print_json(out: &mut impl Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Serialize)]
struct RoleEntry {
    role: &'static str,
    display_name: &'static str,
    permissions: Vec<&'static str>,
}

async fn run(command: Command, config: &Config, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Login { username } => {
            let username = username
                .or_else(|| config.login.username.clone())
                .ok_or(Error::MissingUsername)?;
            let password = config.login.password.as_ref().ok_or(Error::MissingPassword)?;
            let session = open_session(config)?;
            let user = session
                .login(&username, password.expose())
                .await
                .with_context(|| format!("login as {username} failed"))?;
            print_json(out, &user)?;
        }
        Command::Logout => {
            open_session(config)?
                .logout()
                .await
                .context("logout failed")?;
            writeln!(out, "signed out")?;
        }
        Command::Whoami => {
            let user = open_session(config)?
                .current_user()
                .await
                .map_err(session_error)?;
            print_json(out, &user)?;
        }
        Command::Validate => {
            let valid = open_session(config)?.validate().await;
            writeln!(out, "{}", if valid { "valid" } else { "invalid" })?;
        }
        Command::Check => match open_session(config)?.check().await.map_err(session_error)? {
            SessionState::SignedOut => writeln!(out, "signed out")?,
            SessionState::Active(user) => {
                let role = user
                    .role()
                    .map(Role::display_name)
                    .unwrap_or(user.role_name.as_str());
                writeln!(out, "signed in as {} ({role})", user.username)?;
            }
        },
        Command::Get { path } => {
            let response = open_session(config)?
                .gateway()
                .get(&path)
                .await
                .map_err(session_error)
                .with_context(|| format!("GET {path} failed"))?;
            match response.json::<serde_json::Value>() {
                Ok(value) => print_json(out, &value)?,
                Err(_) => writeln!(out, "{}", response.text())?,
            }
        }
        Command::Permissions => {
            let roles: Vec<RoleEntry> = Role::ALL
                .into_iter()
                .map(|role| RoleEntry {
                    role: role.as_str(),
                    display_name: role.display_name(),
                    permissions: role
                        .default_permissions()
                        .iter()
                        .map(|p| p.as_str())
                        .collect(),
                })
                .collect();
            let current = open_session(config)?.user().map(|u| u.permissions);
            print_json(
                out,
                &serde_json::json!({ "roles": roles, "current_user": current }),
            )?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output on stderr and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let (config_path, explicit) = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_or_default(&config_path, explicit)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.backend.base_url,
        session_path = %config.session.path.display(),
        timeout_secs = config.backend.timeout_secs,
        "configuration loaded"
    );

    let mut stdout = std::io::stdout();
    run(cli.command, &config, &mut stdout).await
}
