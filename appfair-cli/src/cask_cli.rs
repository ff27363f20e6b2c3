//! Homebrew cask commands

use anyhow::Result;
use clap::{Parser, Subcommand};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use appfair_core::cask::{CaskAction, CaskPhase};
use appfair_core::AppManager;

use crate::progress::{cancel_on_ctrl_c, DownloadBar};

/// Cask subcommand
#[derive(Parser, Debug)]
pub struct CaskCommand {
    #[clap(subcommand)]
    pub command: CaskSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CaskSubcommand {
    /// Install a cask
    Install {
        /// Cask token, e.g. `firefox`
        token: String,

        /// Print the brew command instead of running it
        #[clap(long)]
        dry_run: bool,
    },

    /// Upgrade an installed cask
    Upgrade {
        /// Cask token
        token: String,

        /// Print the brew command instead of running it
        #[clap(long)]
        dry_run: bool,
    },

    /// Uninstall a cask
    Uninstall {
        /// Cask token
        token: String,

        /// Print the brew command instead of running it
        #[clap(long)]
        dry_run: bool,
    },

    /// List casks installed in the Caskroom
    List {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },
}

impl CaskCommand {
    pub async fn execute(self, manager: &mut AppManager) -> Result<()> {
        match self.command {
            CaskSubcommand::Install { token, dry_run } => {
                run_action(manager, CaskAction::Install, &token, dry_run).await
            }
            CaskSubcommand::Upgrade { token, dry_run } => {
                run_action(manager, CaskAction::Upgrade, &token, dry_run).await
            }
            CaskSubcommand::Uninstall { token, dry_run } => {
                run_action(manager, CaskAction::Uninstall, &token, dry_run).await
            }
            CaskSubcommand::List { json } => list_casks(manager, json),
        }
    }
}

async fn run_action(
    manager: &mut AppManager,
    action: CaskAction,
    token: &str,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        println!("{}", manager.bridge().command(action, token).render());
        return Ok(());
    }

    let bar = DownloadBar::new(token);
    let cancel = cancel_on_ctrl_c();
    let result = manager
        .cask_operation(action, token, bar.progress(), &cancel)
        .await;

    match result {
        Ok(op) => {
            bar.finish("done");
            let phases: Vec<String> = op
                .history()
                .filter(|phase| **phase != CaskPhase::Idle)
                .map(ToString::to_string)
                .collect();
            tracing::debug!(
                "{} {} phases: {} ({} ms)",
                action,
                token,
                phases.join(" -> "),
                op.elapsed().num_milliseconds()
            );
            println!("{action} {token}: done");
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e.into())
        }
    }
}

#[derive(Tabled)]
struct CaskRow {
    #[tabled(rename = "Token")]
    token: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Path")]
    path: String,
}

fn list_casks(manager: &AppManager, json: bool) -> Result<()> {
    let casks = manager.installed_casks();
    if json {
        println!("{}", serde_json::to_string_pretty(casks)?);
        return Ok(());
    }

    if casks.is_empty() {
        println!(
            "No casks installed under {}",
            manager.config().brew.root.display()
        );
        return Ok(());
    }

    let rows: Vec<CaskRow> = casks
        .values()
        .map(|cask| CaskRow {
            token: cask.token.clone(),
            version: cask.current_version().unwrap_or("-").to_string(),
            path: cask.path.display().to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();
    println!("{table}");
    Ok(())
}
