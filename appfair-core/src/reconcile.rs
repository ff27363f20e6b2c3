//! Joining catalog entries with installed state

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::catalog::{CatalogItem, CatalogSource};
use crate::scan::{InstalledCask, ScanReport};
use crate::version::{is_newer, supersedes, AppVersion};

/// One catalog entry with its installed counterpart, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    pub id: String,
    pub name: String,
    pub source: CatalogSource,
    pub available_version: Option<String>,
    pub installed_version: Option<String>,
    pub installed_path: Option<PathBuf>,
    pub update_available: bool,
    pub prerelease: bool,
}

impl AppInfo {
    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some() || self.installed_path.is_some()
    }
}

/// Reduce entries sharing an identifier to the canonical one
///
/// Input order is kept for the survivors.
pub fn collapse_duplicates<'a, I>(items: I, include_prereleases: bool) -> Vec<&'a CatalogItem>
where
    I: IntoIterator<Item = &'a CatalogItem>,
{
    let mut order: Vec<(CatalogSource, &'a str)> = Vec::new();
    let mut best: BTreeMap<(CatalogSource, &'a str), &'a CatalogItem> = BTreeMap::new();

    for item in items {
        let key = (item.source(), item.id());
        match best.get(&key) {
            None => {
                order.push(key);
                best.insert(key, item);
            }
            Some(current) => {
                if supersedes(
                    &AppVersion::parse(item.version().unwrap_or("")),
                    item.is_prerelease(),
                    &AppVersion::parse(current.version().unwrap_or("")),
                    current.is_prerelease(),
                    include_prereleases,
                ) {
                    best.insert(key, item);
                }
            }
        }
    }

    order.into_iter().filter_map(|key| best.get(&key).copied()).collect()
}

/// Canonical catalog entry for an identifier
pub fn preferred_item<'a, I>(items: I, include_prereleases: bool) -> Option<&'a CatalogItem>
where
    I: IntoIterator<Item = &'a CatalogItem>,
{
    collapse_duplicates(items, include_prereleases).into_iter().next()
}

/// Join catalog items with scanned bundles and Caskroom entries
///
/// Output is sorted by name, then identifier.
pub fn reconcile<'a, I>(
    items: I,
    report: &ScanReport,
    casks: &BTreeMap<String, InstalledCask>,
    include_prereleases: bool,
) -> Vec<AppInfo>
where
    I: IntoIterator<Item = &'a CatalogItem>,
{
    let mut infos: Vec<AppInfo> = collapse_duplicates(items, include_prereleases)
        .into_iter()
        .map(|item| {
            let (installed_version, installed_path) = match item {
                CatalogItem::Fair(fair) => report
                    .get(&fair.bundle_identifier)
                    .map(|r| (r.version.clone().or_else(|| r.build.clone()), Some(r.path.clone())))
                    .unwrap_or((None, None)),
                CatalogItem::Cask(cask) => casks
                    .get(&cask.token)
                    .map(|c| {
                        (
                            c.current_version()
                                .map(|v| v.split(',').next().unwrap_or(v).to_string()),
                            Some(c.path.clone()),
                        )
                    })
                    .unwrap_or((None, None)),
            };

            let available_version = item.version().map(str::to_string);
            let update_available = match (&available_version, &installed_version) {
                (Some(available), Some(installed)) => is_newer(available, installed),
                _ => false,
            };

            AppInfo {
                id: item.id().to_string(),
                name: item.name().to_string(),
                source: item.source(),
                available_version,
                installed_version,
                installed_path,
                update_available,
                prerelease: item.is_prerelease(),
            }
        })
        .collect();

    infos.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    infos
}

/// Entries with a newer catalog version than the installed one
pub fn outdated(infos: &[AppInfo]) -> Vec<&AppInfo> {
    infos.iter().filter(|i| i.update_available).collect()
}

/// Entries that are installed locally
pub fn installed_only(infos: &[AppInfo]) -> Vec<&AppInfo> {
    infos.iter().filter(|i| i.is_installed()).collect()
}
