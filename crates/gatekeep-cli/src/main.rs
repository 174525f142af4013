//! gatekeep - log in to an Auth service and keep the session alive.
//!
//! The session survives between invocations in the configured credential
//! storage. `watch` keeps the access token fresh until interrupted or until
//! the server ends the session.

mod app;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gatekeep_core::auth::guard::post_login_destination;
use gatekeep_core::storage::{CredentialStorage, TEST_AUTO_LOGIN_OVERRIDE_KEY};
use gatekeep_core::{Config, GuardDecision, SchedulerState};

use app::App;

// ============================================================================
// Constants
// ============================================================================

/// Username to log in with when none is given on the command line
const USERNAME_VAR: &str = "GATEKEEP_USERNAME";

/// Password to log in with instead of prompting
const PASSWORD_VAR: &str = "GATEKEEP_PASSWORD";

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "gatekeep.log";

#[derive(Parser)]
#[command(name = "gatekeep", version, about = "Log in to an Auth service and keep the session alive")]
struct Cli {
    /// Also write logs to a daily rolling file in the data directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
        /// Path the login was requested from
        #[arg(long)]
        redirect: Option<String>,
    },
    /// End the session here and on the server
    Logout,
    /// Show the stored session
    Status,
    /// Confirm the stored session with the server and show the user
    Whoami,
    /// Decide whether a protected path renders or redirects to login
    Check {
        path: String,
        /// Auto-login mode reported by the deployment
        #[arg(long)]
        auto_login: Option<bool>,
        /// Force the redirect to login
        #[arg(long)]
        force_login_redirect: bool,
    },
    /// Keep the access token fresh until Ctrl-C or the session ends
    Watch,
    /// Manage the API key
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyAction,
    },
}

#[derive(Subcommand)]
enum ApiKeyAction {
    Set { key: String },
    Clear,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_dir = if cli.log_file {
        Some(Config::default().data_dir()?.join("logs"))
    } else {
        None
    };
    let _log_guard = init_tracing(log_dir);

    let mut app = App::new()?;

    match cli.command {
        Command::Login { username, redirect } => login(&mut app, username, redirect).await,
        Command::Logout => {
            app.auth.logout().await;
            println!("Logged out");
            Ok(())
        }
        Command::Status => {
            status(&app);
            Ok(())
        }
        Command::Whoami => whoami(&app).await,
        Command::Check {
            path,
            auto_login,
            force_login_redirect,
        } => check(&app, &path, auto_login, force_login_redirect),
        Command::Watch => watch(&app).await,
        Command::ApiKey { action } => {
            match action {
                ApiKeyAction::Set { key } => {
                    app.store.set_api_key(Some(key))?;
                    println!("API key stored");
                }
                ApiKeyAction::Clear => {
                    app.store.set_api_key(None)?;
                    println!("API key cleared");
                }
            }
            Ok(())
        }
    }
}

fn prompt_username(default: Option<&str>) -> Result<String> {
    match default {
        Some(last_user) => print!("Username [{}]: ", last_user),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match default {
        Some(last_user) if input.is_empty() => last_user.to_string(),
        _ => input.to_string(),
    })
}

async fn login(app: &mut App, username: Option<String>, redirect: Option<String>) -> Result<()> {
    let username = match username.or_else(|| std::env::var(USERNAME_VAR).ok()) {
        Some(username) => username,
        None => prompt_username(app.config.last_username.as_deref())?,
    };
    let password = match std::env::var(PASSWORD_VAR) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    let user = match app.auth.login(&username, &password).await {
        Ok(user) => user,
        Err(e) => {
            eprintln!("Login failed: {}", e.user_message());
            return Err(e.into());
        }
    };

    app.config.last_username = Some(user.username.clone());
    if let Err(e) = app.config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    println!("Logged in as {}", user.display_name());
    println!("Continue at {}", post_login_destination(redirect.as_deref()));
    Ok(())
}

fn status(app: &App) {
    let session = app.store.snapshot();
    if !session.is_authenticated {
        println!("Not logged in");
    } else {
        match session.user {
            Some(ref user) => println!("Logged in as {} ({})", user.display_name(), user.role),
            None => println!("Logged in (restored session, run `gatekeep whoami` to confirm)"),
        }
        println!("Admin: {}", if session.is_admin { "yes" } else { "no" });
    }

    let auto_login = match session.auto_login {
        Some(true) => "on",
        Some(false) => "off",
        None => "unknown",
    };
    println!(
        "Auto-login: {} ({})",
        auto_login,
        if app.env.auto_login_enabled { "permitted" } else { "not permitted" }
    );
    println!("API key: {}", if session.api_key.is_some() { "set" } else { "not set" });
    println!("Refresh every {}s", app.scheduler.interval().as_secs());
    if session.authentication_error_count > 0 {
        println!("Recent authentication failures: {}", session.authentication_error_count);
    }
}

async fn whoami(app: &App) -> Result<()> {
    if !app.store.is_authenticated() {
        bail!("Not logged in");
    }
    match app.auth.verify_session().await {
        Ok(user) => {
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}

fn check(app: &App, path: &str, auto_login: Option<bool>, force_login_redirect: bool) -> Result<()> {
    if auto_login.is_some() {
        app.store.set_auto_login(auto_login);
    }
    if force_login_redirect {
        app.transient.set(TEST_AUTO_LOGIN_OVERRIDE_KEY, "true")?;
    }

    match app.guard.check(path) {
        GuardDecision::Render => println!("render {}", path),
        GuardDecision::Redirect(target) => println!("redirect {}", target),
    }
    Ok(())
}

async fn watch(app: &App) -> Result<()> {
    if !app.store.is_authenticated() {
        bail!("Not logged in");
    }

    let mut states = app.scheduler.watch_state();
    let handle = app.scheduler.start();
    let mut status = app.store.subscribe();
    info!(interval_secs = app.scheduler.interval().as_secs(), "Keeping session alive");
    println!(
        "Keeping session alive, refreshing every {}s (Ctrl-C to stop)",
        app.scheduler.interval().as_secs()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let session_ended = status.wait_for(|s| !s.authenticated);
    tokio::pin!(session_ended);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("Stopped");
                break;
            }
            _ = &mut session_ended => {
                println!("Session ended, log in again");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                debug!(?state, "Refresh scheduler state changed");
                if state == SchedulerState::Refreshing {
                    println!("Refreshing access token");
                }
            }
        }
    }

    handle.stop();
    Ok(())
}
