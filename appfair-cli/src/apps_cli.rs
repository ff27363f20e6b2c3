//! Catalog, installed-state and install commands

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use appfair_core::catalog::{CachePolicy, CatalogSource};
use appfair_core::error::FairError;
use appfair_core::install::reveal_command as reveal_invocation;
use appfair_core::reconcile::{outdated, AppInfo};
use appfair_core::watcher::InstallWatcher;
use appfair_core::AppManager;

use crate::progress::{cancel_on_ctrl_c, DownloadBar};

const ALL_SOURCES: [CatalogSource; 2] = [CatalogSource::Fair, CatalogSource::Cask];

fn cache_policy(refresh: bool) -> CachePolicy {
    if refresh {
        CachePolicy::Reload
    } else {
        CachePolicy::UseCache
    }
}

/// Load the requested catalogs; failures are queued on the manager
async fn load_catalogs(manager: &mut AppManager, source: Option<CatalogSource>, refresh: bool) {
    let sources: &[CatalogSource] = match source {
        Some(CatalogSource::Fair) => &ALL_SOURCES[..1],
        Some(CatalogSource::Cask) => &ALL_SOURCES[1..],
        None => &ALL_SOURCES,
    };
    manager.refresh_all(sources, cache_policy(refresh)).await;
}

fn render_table<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Identifier")]
    id: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Available")]
    available: String,
    #[tabled(rename = "Installed")]
    installed: String,
}

impl From<&AppInfo> for AppRow {
    fn from(info: &AppInfo) -> Self {
        let mut available = info.available_version.clone().unwrap_or_else(|| "-".into());
        if info.prerelease {
            available.push_str(" (beta)");
        }
        let installed = match (&info.installed_version, info.update_available) {
            (Some(v), true) => format!("{v} *"),
            (Some(v), false) => v.clone(),
            (None, _) if info.is_installed() => "?".to_string(),
            (None, _) => String::new(),
        };
        Self {
            name: info.name.clone(),
            id: info.id.clone(),
            source: info.source.to_string(),
            available,
            installed,
        }
    }
}

pub async fn catalog_command(
    manager: &mut AppManager,
    query: Option<&str>,
    source: Option<CatalogSource>,
    refresh: bool,
    json: bool,
) -> Result<()> {
    load_catalogs(manager, source, refresh).await;

    let mut infos = manager.app_infos(source);
    if let Some(query) = query {
        let hits: BTreeSet<(CatalogSource, String)> = manager
            .store()
            .search(query, source)
            .into_iter()
            .map(|item| (item.source(), item.id().to_string()))
            .collect();
        infos.retain(|info| hits.contains(&(info.source, info.id.clone())));
    }

    if json {
        return print_json(&infos);
    }

    if infos.is_empty() {
        println!("No apps found.");
        return Ok(());
    }

    let rows: Vec<AppRow> = infos.iter().map(AppRow::from).collect();
    println!("{}", render_table(&rows));
    println!("\n{} app(s); * marks an available update", infos.len());
    Ok(())
}

#[derive(Tabled)]
struct InstalledRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Identifier")]
    id: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Path")]
    path: String,
}

pub fn installed_command(manager: &AppManager, json: bool) -> Result<()> {
    let report = manager.scan_report();
    if json {
        return print_json(report);
    }

    if report.installed.is_empty() {
        println!(
            "No apps installed in {}",
            manager.config().install_dir.display()
        );
    } else {
        let rows: Vec<InstalledRow> = report
            .installed
            .values()
            .map(|record| InstalledRow {
                name: record.name.clone(),
                id: record.bundle_id.clone(),
                version: match (&record.version, &record.build) {
                    (Some(v), Some(b)) if v != b => format!("{v} ({b})"),
                    (Some(v), _) => v.clone(),
                    (None, Some(b)) => b.clone(),
                    (None, None) => "-".to_string(),
                },
                path: record.path.display().to_string(),
            })
            .collect();
        println!("{}", render_table(&rows));
    }

    for failure in &report.failures {
        eprintln!(
            "Warning: could not read {}: {}",
            failure.path.display(),
            failure.reason
        );
    }
    Ok(())
}

pub async fn outdated_command(
    manager: &mut AppManager,
    source: Option<CatalogSource>,
    refresh: bool,
) -> Result<()> {
    load_catalogs(manager, source, refresh).await;

    let infos = manager.app_infos(source);
    let updates = outdated(&infos);
    if updates.is_empty() {
        println!("Everything is up to date.");
        return Ok(());
    }

    let rows: Vec<AppRow> = updates.into_iter().map(AppRow::from).collect();
    println!("{}", render_table(&rows));
    Ok(())
}

pub async fn install_command(manager: &mut AppManager, id: &str, refresh: bool) -> Result<()> {
    manager
        .refresh_catalog(CatalogSource::Fair, cache_policy(refresh))
        .await?;

    let name = manager
        .find_item(CatalogSource::Fair, id)
        .map(|item| item.name().to_string())
        .unwrap_or_else(|| id.to_string());

    let bar = DownloadBar::new(&name);
    let cancel = cancel_on_ctrl_c();
    match manager.install(id, bar.progress(), &cancel).await {
        Ok(path) => {
            bar.finish("done");
            println!("Installed {} at {}", name, path.display());
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            if e.is_cancellation() {
                println!("Install of {name} cancelled.");
            }
            Err(e.into())
        }
    }
}

pub async fn trash_command(manager: &mut AppManager, id: &str) -> Result<()> {
    let trashed = manager.trash(id).await?;
    println!("Moved {} to {}", id, trashed.display());
    Ok(())
}

pub async fn reveal_command(manager: &AppManager, id: &str) -> Result<()> {
    let record = manager
        .scan_report()
        .find(id)
        .ok_or_else(|| FairError::NotFound {
            what: "installed app",
            id: id.to_string(),
        })?;

    let (program, args) = reveal_invocation(&record.path);
    let status = tokio::process::Command::new(&program)
        .args(&args)
        .status()
        .await
        .map_err(|e| FairError::io("Failed to launch file manager", &record.path, e))?;

    if !status.success() {
        return Err(FairError::ExternalProcess {
            command: format!("{} {}", program, args.join(" ")),
            code: status.code(),
            output: String::new(),
        }
        .into());
    }
    Ok(())
}

pub async fn watch_command(manager: &mut AppManager) -> Result<()> {
    let dir = manager.config().install_dir.clone();
    let mut watcher = InstallWatcher::start(&dir, manager.config().watch_debounce())?;
    println!("Watching {} (Ctrl-C to stop)", dir.display());

    loop {
        tokio::select! {
            request = watcher.next_rescan() => {
                let Some(request) = request else { break };
                let report = manager.rescan().await;
                println!(
                    "{} change(s) in {} entr{}; {} app(s) installed, {} unreadable",
                    request.events,
                    request.paths.len(),
                    if request.paths.len() == 1 { "y" } else { "ies" },
                    report.installed.len(),
                    report.failures.len()
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
