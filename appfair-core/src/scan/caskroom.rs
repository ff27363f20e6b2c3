//! Installed Homebrew casks
//!
//! Homebrew records each installed cask as `<root>/Caskroom/<token>/<version>/`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::version::AppVersion;

/// A cask present in the Caskroom
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledCask {
    pub token: String,
    pub path: PathBuf,
    /// Version directories, oldest first
    pub versions: Vec<String>,
}

impl InstalledCask {
    /// Highest installed version
    pub fn current_version(&self) -> Option<&str> {
        self.versions.last().map(String::as_str)
    }
}

/// Caskroom directory for a Homebrew prefix
pub fn caskroom_dir(brew_root: &Path) -> PathBuf {
    brew_root.join("Caskroom")
}

/// List installed casks, keyed by token
///
/// A missing Caskroom yields an empty map.
pub fn scan_caskroom(brew_root: &Path) -> BTreeMap<String, InstalledCask> {
    let caskroom = caskroom_dir(brew_root);
    let mut casks: BTreeMap<String, InstalledCask> = BTreeMap::new();

    let walker = walkdir::WalkDir::new(&caskroom)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name()));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();

        match entry.depth() {
            1 => {
                casks.entry(name.clone()).or_insert_with(|| InstalledCask {
                    token: name,
                    path: entry.path().to_path_buf(),
                    versions: Vec::new(),
                });
            }
            _ => {
                let Some(token) = entry
                    .path()
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|t| t.to_string_lossy().to_string())
                else {
                    continue;
                };
                if let Some(cask) = casks.get_mut(&token) {
                    cask.versions.push(name);
                }
            }
        }
    }

    for cask in casks.values_mut() {
        cask.versions
            .sort_by_key(|v| AppVersion::parse(v.split(',').next().unwrap_or(v)));
    }

    tracing::debug!("Found {} casks in {}", casks.len(), caskroom.display());
    casks
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
