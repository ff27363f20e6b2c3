//! appfair - browse, install and update app bundles and Homebrew casks
//!
//! The CLI is the composition root: it loads [`FairConfig`], builds one
//! [`AppManager`], runs a single command against it and then prints whatever
//! ended up in the manager's error queue.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use appfair_core::catalog::CatalogSource;
use appfair_core::config::FairConfig;
use appfair_core::{AppManager, FairError};

mod apps_cli;
mod cask_cli;
mod progress;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Catalog source selector
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    /// The App Fair catalog
    Fair,
    /// Homebrew casks
    Cask,
}

impl From<SourceArg> for CatalogSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Fair => CatalogSource::Fair,
            SourceArg::Cask => CatalogSource::Cask,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "appfair",
    about = "Browse, install and update apps from the App Fair catalog and Homebrew casks",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Config file (defaults to the platform config directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[clap(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON on stderr
    #[clap(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog apps with their installed state
    Catalog {
        /// Filter by name, identifier or description
        query: Option<String>,

        /// Only show one catalog
        #[clap(long, value_enum)]
        source: Option<SourceArg>,

        /// Bypass the catalog cache
        #[clap(long)]
        refresh: bool,

        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// List bundles found in the installation directory
    Installed {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// List installed apps with a newer catalog version
    Outdated {
        /// Only check one catalog
        #[clap(long, value_enum)]
        source: Option<SourceArg>,

        /// Bypass the catalog cache
        #[clap(long)]
        refresh: bool,
    },

    /// Install or update an app from the App Fair catalog
    Install {
        /// Bundle identifier or app name
        id: String,

        /// Bypass the catalog cache
        #[clap(long)]
        refresh: bool,
    },

    /// Move an installed app to the trash
    Trash {
        /// Bundle identifier or app name
        id: String,
    },

    /// Show an installed app in the file manager
    Reveal {
        /// Bundle identifier or app name
        id: String,
    },

    /// Install, upgrade or remove Homebrew casks
    Cask(cask_cli::CaskCommand),

    /// Watch the installation directory and rescan on changes
    Watch,

    /// Print the effective configuration
    Config {
        /// Print only the config file path
        #[clap(long)]
        path: bool,
    },
}

fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_env("APPFAIR_LOG")
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => FairConfig::default_config_path(),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<FairConfig> {
    let path = config_path(explicit)?;
    FairConfig::load_from_path(&path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level, cli.json_logs);

    if let Command::Config { path } = &cli.command {
        return config_command(cli.config.as_deref(), *path);
    }

    let config = load_config(cli.config.as_deref())?;
    let mut manager = AppManager::new(config).context("Failed to initialise appfair")?;
    manager.rescan().await;

    let outcome = match cli.command {
        Command::Catalog {
            query,
            source,
            refresh,
            json,
        } => {
            apps_cli::catalog_command(
                &mut manager,
                query.as_deref(),
                source.map(Into::into),
                refresh,
                json,
            )
            .await
        }
        Command::Installed { json } => apps_cli::installed_command(&manager, json),
        Command::Outdated { source, refresh } => {
            apps_cli::outdated_command(&mut manager, source.map(Into::into), refresh).await
        }
        Command::Install { id, refresh } => {
            apps_cli::install_command(&mut manager, &id, refresh).await
        }
        Command::Trash { id } => apps_cli::trash_command(&mut manager, &id).await,
        Command::Reveal { id } => apps_cli::reveal_command(&manager, &id).await,
        Command::Cask(command) => command.execute(&mut manager).await,
        Command::Watch => apps_cli::watch_command(&mut manager).await,
        Command::Config { .. } => Ok(()),
    };

    if let Err(e) = outcome {
        match e.downcast::<FairError>() {
            Ok(error) => {
                manager.record_error(error);
            }
            Err(other) => return Err(other),
        }
    }
    report_errors(&mut manager)
}

/// Print queued errors and fail if there were any
fn report_errors(manager: &mut AppManager) -> Result<()> {
    let errors = manager.take_errors();
    if errors.is_empty() {
        return Ok(());
    }

    for error in &errors {
        eprintln!("Error: {error}");
        if error.is_retryable() {
            eprintln!("  (this may succeed if you try again)");
        }
    }
    anyhow::bail!("{} operation(s) failed", errors.len())
}

fn config_command(explicit: Option<&Path>, path_only: bool) -> Result<()> {
    let path = config_path(explicit)?;
    if path_only {
        println!("{}", path.display());
        return Ok(());
    }

    let config = FairConfig::load_from_path(&path)?;
    let yaml = serde_yaml_ng::to_string(&config).context("Failed to serialize config")?;
    println!("# {}", path.display());
    print!("{yaml}");
    Ok(())
}
