// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! icasync CLI - drives the ICA coordinator from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Log in and persist the session
//! ICA_USERNAME=198001019999 ICA_PASSWORD=... icasync login
//!
//! # Show the persisted session
//! icasync status
//!
//! # Run one refresh cycle
//! icasync refresh --track <offline-id>
//!
//! # Print the tracked shopping lists
//! icasync lists --track <offline-id>
//!
//! # Print the reconciled offers
//! icasync offers --format json --pretty
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use icasync_core::{AuthCredentials, IcaEvent};
use icasync_coordinator::{CoordinatorConfig, EventSink, IcaCoordinator};
use icasync_fetch::IcaAuthenticator;
use icasync_store::{default_cache_dir, default_config_dir, SessionStore};

// ============================================================================
// CLI Definition
// ============================================================================

/// icasync CLI - ICA shopping-list and offer polling.
#[derive(Parser)]
#[command(name = "icasync")]
#[command(about = "ICA shopping-list session, cache and polling CLI")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Account user name (personal id). Falls back to $ICA_USERNAME.
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Account password. Falls back to $ICA_PASSWORD.
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Offline id of a shopping list to track. Repeatable.
    #[arg(long = "track", global = true)]
    pub tracked_lists: Vec<String>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Log in and persist the session.
    Login,
    /// Show the persisted session.
    Status,
    /// Run one refresh cycle over every cached resource.
    Refresh(RefreshArgs),
    /// Print the tracked shopping lists (runs a refresh first).
    Lists,
    /// Print the reconciled offers (runs a refresh first).
    Offers,
}

/// Arguments for the refresh command.
#[derive(clap::Args)]
pub struct RefreshArgs {
    /// Bypass every cache TTL and refetch all resources.
    #[arg(long)]
    pub force: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Missing credentials.
    NoCredentials = 2,
}

// ============================================================================
// Event Sink
// ============================================================================

/// Forwards coordinator events to the log stream.
struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: IcaEvent) {
        info!(event_type = %event.event_type, payload = %event.payload, "Event");
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("icasync=debug,info")
    } else {
        EnvFilter::new("icasync=info")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Login => run_login(&cli).await,
        Commands::Status => run_status(&cli).await,
        Commands::Refresh(args) => run_refresh(&cli, args.force).await,
        Commands::Lists => run_lists(&cli).await,
        Commands::Offers => run_offers(&cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::Error as i32);
    }

    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn credentials(cli: &Cli) -> Result<AuthCredentials> {
    let username = cli
        .username
        .clone()
        .or_else(|| std::env::var("ICA_USERNAME").ok())
        .context("no user name: pass --username or set ICA_USERNAME")?;
    let password = cli
        .password
        .clone()
        .or_else(|| std::env::var("ICA_PASSWORD").ok())
        .context("no password: pass --password or set ICA_PASSWORD")?;
    Ok(AuthCredentials::new(username, password))
}

async fn build_coordinator(cli: &Cli) -> Result<IcaCoordinator> {
    let credentials = credentials(cli)?;
    let session = SessionStore::new().load().await;

    let config = CoordinatorConfig {
        uid: credentials.username.clone(),
        tracked_lists: cli.tracked_lists.clone(),
        cache_dir: default_cache_dir(),
        config_dir: default_config_dir(),
    };
    let coordinator =
        IcaCoordinator::new(credentials, session, Arc::new(LogSink), config)?;
    // The CLI has no startup window; deliver events as they happen.
    coordinator.worker().mark_loaded();
    Ok(coordinator)
}

fn print_json<T: serde::Serialize>(cli: &Cli, value: &T) -> Result<()> {
    let json = if cli.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

async fn run_login(cli: &Cli) -> Result<()> {
    let credentials = credentials(cli)?;
    let store = SessionStore::new();

    let mut authenticator = IcaAuthenticator::new(credentials, store.load().await)?;
    let state = authenticator.ensure_login(false).await?;
    store.save(&state).await?;

    match &state.user {
        Some(user) => println!("Logged in as {}", user.person_name),
        None => println!("Logged in"),
    }
    Ok(())
}

async fn run_status(cli: &Cli) -> Result<()> {
    let Some(state) = SessionStore::new().load().await else {
        println!("No persisted session");
        return Ok(());
    };

    if cli.format == OutputFormat::Json {
        return print_json(cli, &state);
    }

    match &state.user {
        Some(user) => println!("User:    {}", user.person_name),
        None => println!("User:    <unknown>"),
    }
    match &state.token {
        Some(token) => match token.expiry {
            Some(expiry) => println!("Token:   held, expires {expiry}"),
            None => println!("Token:   held, no expiry stamp"),
        },
        None => println!("Token:   none"),
    }
    println!(
        "Client:  {}",
        state
            .client
            .as_ref()
            .map_or("not registered", |_| "registered")
    );
    Ok(())
}

async fn run_refresh(cli: &Cli, force: bool) -> Result<()> {
    let mut coordinator = build_coordinator(cli).await?;
    coordinator
        .refresh_data(if force { Some(true) } else { None })
        .await?;

    let lists = coordinator.tracked_shopping_lists().await;
    let offers = coordinator.offer_details().await;
    if !cli.quiet {
        println!(
            "Refreshed: {} tracked list(s), {} offer(s)",
            lists.len(),
            offers.len()
        );
    }
    coordinator.worker().shutdown();
    Ok(())
}

async fn run_lists(cli: &Cli) -> Result<()> {
    let mut coordinator = build_coordinator(cli).await?;
    coordinator.refresh_data(None).await?;
    let lists = coordinator.tracked_shopping_lists().await;
    coordinator.worker().shutdown();

    if cli.format == OutputFormat::Json {
        return print_json(cli, &lists);
    }

    if lists.is_empty() {
        println!("No tracked lists (pass --track <offline-id>)");
        return Ok(());
    }
    for list in &lists {
        println!("{} ({} rows)  [{}]", list.title, list.rows.len(), list.offline_id);
        for row in &list.rows {
            let mark = if row.is_striked_over { "x" } else { " " };
            println!("  [{mark}] {}", row.product_name);
        }
    }
    Ok(())
}

async fn run_offers(cli: &Cli) -> Result<()> {
    let mut coordinator = build_coordinator(cli).await?;
    coordinator.refresh_data(None).await?;
    let offers = coordinator.offer_details().await;
    coordinator.worker().shutdown();

    if cli.format == OutputFormat::Json {
        return print_json(cli, &offers);
    }

    if offers.is_empty() {
        println!("No offers");
        return Ok(());
    }
    for offer in &offers {
        println!(
            "{}  {}",
            offer.id,
            offer.name.as_deref().unwrap_or("<unnamed>")
        );
        if let Some(valid_to) = offer.valid_to {
            println!("  valid to {valid_to}");
        }
    }
    Ok(())
}
