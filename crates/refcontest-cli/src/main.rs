//! refcontest - referral contest operator CLI
//!
//! Opens the contest database directly and runs maintenance commands:
//! statistics, leaderboard, contest lifecycle, resets, and prize, channel,
//! admin, and ad management.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use refcontest_core::{ContestConfig, SqliteStore};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// refcontest - referral contest operator CLI
#[derive(Parser, Debug)]
#[command(name = "refcontest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to contest configuration file
    #[arg(short, long, default_value = "contest.toml")]
    config: PathBuf,

    /// Database path (overrides `store.path` from the config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Reports ===
    /// Show store-wide counters
    Stats,

    /// Show the leaderboard
    Top {
        /// Number of rows
        #[arg(short = 'n', long, default_value = "10")]
        limit: u32,
    },

    /// Show one user's record, counts, and rank
    User {
        /// User id
        id: i64,
    },

    /// Print a user's invite link
    Link {
        /// User id
        id: i64,
    },

    // === Lifecycle ===
    /// Contest lifecycle commands
    #[command(subcommand)]
    Contest(commands::contest::ContestCommand),

    /// Delete selected data
    Reset(commands::contest::ResetArgs),

    // === Catalog ===
    /// Prize list management
    #[command(subcommand)]
    Prize(commands::catalog::PrizeCommand),

    /// Required channel management
    #[command(subcommand)]
    Channel(commands::catalog::ChannelCommand),

    // === Admin ===
    /// Admin set management
    #[command(subcommand)]
    Admin(commands::admin::AdminCommand),

    /// Ad footer and button
    #[command(subcommand)]
    Ads(commands::admin::AdsCommand),

    /// Print the effective configuration
    Config,
}

/// Loads the config file when present, falling back to defaults, then
/// applies the environment and the `--db` override.
fn resolve_config(cli: &Cli) -> Result<ContestConfig> {
    let mut config = if cli.config.exists() {
        ContestConfig::from_file(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?
    } else {
        debug!(path = %cli.config.display(), "config file not found, using defaults");
        ContestConfig::default()
    };
    if let Some(db) = &cli.db {
        config.store.path.clone_from(db);
    }
    config.validate().context("invalid configuration")?;
    Ok(config.with_env_overrides())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = resolve_config(&cli)?;
    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let store = SqliteStore::open_with_timeout(&config.store.path, config.store.busy_timeout())
        .with_context(|| format!("failed to open {}", config.store.path.display()))?;
    let ctx = commands::Context {
        store,
        config,
        json: cli.json,
    };

    match cli.command {
        Commands::Stats => commands::report::stats(&ctx),
        Commands::Top { limit } => commands::report::top(&ctx, limit),
        Commands::User { id } => commands::report::user(&ctx, id),
        Commands::Link { id } => commands::report::link(&ctx, id),
        Commands::Contest(cmd) => commands::contest::run(&ctx, &cmd),
        Commands::Reset(args) => commands::contest::reset(&ctx, &args),
        Commands::Prize(cmd) => commands::catalog::run_prize(&ctx, &cmd),
        Commands::Channel(cmd) => commands::catalog::run_channel(&ctx, &cmd),
        Commands::Admin(cmd) => commands::admin::run_admin(&ctx, &cmd),
        Commands::Ads(cmd) => commands::admin::run_ads(&ctx, &cmd),
        Commands::Config => Ok(()),
    }
}
