//! folio - terminal client for the portfolio dashboard.
//!
//! Signs in against the dashboard API, keeps the refresh cookie in the OS
//! keychain between runs, and exposes the dashboard pages as subcommands.

mod commands;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use folio_core::{
    AuthorizedHttpClient, Config, CredentialCache, DashboardApi, RefreshProofStore, SessionStore,
};

// ============================================================================
// Constants
// ============================================================================

/// File name prefix for the daily rolling log.
const LOG_FILE_PREFIX: &str = "folio.log";

// ============================================================================
// Arguments
// ============================================================================

/// Portfolio dashboard client
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Terminal client for the folio portfolio dashboard", long_about = None)]
#[command(version)]
struct Cli {
    /// Dashboard API base URL (overrides config and FOLIO_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account
    Register {
        /// Account email
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Sign in with email and password
    Login {
        /// Account email (default: last one used)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Sign out and forget the stored refresh cookie
    Logout,

    /// Show the signed-in account
    Whoami,

    /// Show holdings with live quotes
    Portfolio,

    /// Add a position to the portfolio
    Add {
        /// Ticker symbol (e.g., AAPL)
        symbol: String,

        /// Number of shares
        quantity: f64,

        /// Price paid per share
        price: f64,
    },

    /// Remove a position from the portfolio
    Remove {
        /// Ticker symbol
        symbol: String,
    },

    /// Show a live quote
    Quote {
        /// Ticker symbol
        symbol: String,
    },

    /// Search symbols and company names
    Search {
        /// Search text
        query: String,
    },

    /// Ask the portfolio assistant a question
    Ask {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Account settings
    #[command(subcommand)]
    Settings(SettingsCommands),
}

impl Commands {
    /// Commands after which the refresh cookie must not be written back to
    /// the keychain.
    fn signs_out(&self) -> bool {
        matches!(
            self,
            Commands::Logout | Commands::Settings(SettingsCommands::DeleteAccount { .. })
        )
    }
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    /// Change the display name
    Username { username: String },

    /// Change the account email
    Email { email: String },

    /// Set the dashboard theme
    Theme {
        #[arg(value_enum)]
        theme: Theme,
    },

    /// Turn email notifications on or off
    Notifications {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Permanently delete the account
    DeleteAccount {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Theme {
    Light,
    Dark,
}

impl Theme {
    fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

// ============================================================================
// Start-up
// ============================================================================

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
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

fn load_config(api_url: Option<String>) -> Result<Config> {
    let mut config = Config::load()
        .context("Failed to load configuration")?
        .with_env_overrides();
    if let Some(url) = api_url {
        config.api_base_url = url;
    }
    Ok(config)
}

/// Build the session and put last run's refresh cookie back into its jar.
fn build_session(config: &Config) -> Result<SessionStore> {
    let mut session = SessionStore::new(config)?;
    match config.cache_dir() {
        Ok(dir) => session = session.with_cache(CredentialCache::new(dir)),
        Err(e) => warn!(error = %e, "No cache directory, running without credential cache"),
    }

    if let Some(email) = config.last_email.as_deref() {
        match RefreshProofStore::load(email) {
            Ok(Some(proof)) => {
                debug!(email = email, "Seeding refresh cookie from keychain");
                session.seed_refresh_proof(&proof);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not read refresh cookie from keychain"),
        }
    }
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    let mut config = load_config(cli.api_url)?;
    info!(api = %config.api_base_url, "folio starting");

    let session = Arc::new(build_session(&config)?);
    let api = DashboardApi::new(AuthorizedHttpClient::new(session.clone()));

    // Login establishes its own session; everything else resumes the last one.
    if !matches!(cli.command, Commands::Login { .. } | Commands::Register { .. }) {
        session.start().await;
    }

    let signs_out = cli.command.signs_out();

    let result = match cli.command {
        Commands::Register { email } => commands::register(&session, email).await,
        Commands::Login { email } => commands::login(&session, &mut config, email).await,
        Commands::Logout => commands::logout(&session, &config).await,
        Commands::Whoami => commands::whoami(&api).await,
        Commands::Portfolio => commands::portfolio(&api).await,
        Commands::Add {
            symbol,
            quantity,
            price,
        } => commands::add(&api, &symbol, quantity, price).await,
        Commands::Remove { symbol } => commands::remove(&api, &symbol).await,
        Commands::Quote { symbol } => commands::quote(&api, &symbol).await,
        Commands::Search { query } => commands::search(&api, &query).await,
        Commands::Ask { prompt } => commands::ask(&api, &prompt.join(" ")).await,
        Commands::Settings(settings) => match settings {
            SettingsCommands::Username { username } => {
                commands::update_username(&api, &username).await
            }
            SettingsCommands::Email { email } => commands::update_email(&api, &email).await,
            SettingsCommands::Theme { theme } => commands::set_theme(&api, theme.as_str()).await,
            SettingsCommands::Notifications { state } => {
                commands::set_notifications(&api, matches!(state, Toggle::On)).await
            }
            SettingsCommands::DeleteAccount { yes } => {
                commands::delete_account(&api, &config, yes).await
            }
        },
    };

    // The backend may rotate the refresh cookie on any refresh.
    if !signs_out {
        commands::persist_refresh_proof(&session, &config);
    }

    info!("folio shutting down");
    result
}
