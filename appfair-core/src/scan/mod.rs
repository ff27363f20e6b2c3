//! Local installation scanning
//!
//! Lists the installation directory, reads each bundle's Info.plist and
//! builds a [`ScanReport`]. A bundle with unreadable metadata becomes a
//! [`ScanFailure`] and never hides the other bundles.

mod caskroom;
mod plist;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use caskroom::{caskroom_dir, scan_caskroom, InstalledCask};
pub use plist::{info_plist_path, parse_info_plist, read_bundle_info, BundleInfo};

use crate::error::FairError;
use crate::version::{supersedes, AppVersion};

/// An installed bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledRecord {
    pub path: PathBuf,
    pub bundle_id: String,
    pub name: String,
    /// CFBundleShortVersionString
    pub version: Option<String>,
    /// CFBundleVersion
    pub build: Option<String>,
}

impl InstalledRecord {
    fn from_info(path: PathBuf, info: BundleInfo) -> Self {
        let name = info.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });
        Self {
            path,
            bundle_id: info.identifier,
            name,
            version: info.short_version,
            build: info.build_version,
        }
    }

    /// Comparable version: short version, else build number
    pub fn app_version(&self) -> AppVersion {
        AppVersion::parse(self.version.as_deref().or(self.build.as_deref()).unwrap_or(""))
    }

    pub fn is_prerelease(&self) -> bool {
        self.app_version().is_prerelease()
    }
}

/// A bundle that could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// One record per bundle identifier
    pub installed: BTreeMap<String, InstalledRecord>,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn get(&self, bundle_id: &str) -> Option<&InstalledRecord> {
        self.installed.get(bundle_id)
    }

    /// Look up a record by bundle identifier or display name
    pub fn find(&self, id_or_name: &str) -> Option<&InstalledRecord> {
        self.installed.get(id_or_name).or_else(|| {
            self.installed
                .values()
                .find(|r| r.name.eq_ignore_ascii_case(id_or_name))
        })
    }

    /// Insert a record, keeping whichever version is canonical
    fn insert(&mut self, record: InstalledRecord, include_prereleases: bool) {
        match self.installed.get(&record.bundle_id) {
            Some(current)
                if !supersedes(
                    &record.app_version(),
                    record.is_prerelease(),
                    &current.app_version(),
                    current.is_prerelease(),
                    include_prereleases,
                ) =>
            {
                tracing::debug!(
                    "Ignoring duplicate {} at {}",
                    record.bundle_id,
                    record.path.display()
                );
            }
            _ => {
                self.installed.insert(record.bundle_id.clone(), record);
            }
        }
    }
}

/// Settings for a scan
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Recognised bundle extensions, without the dot
    pub extensions: Vec<String>,
    pub include_prereleases: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["app".to_string()],
            include_prereleases: false,
        }
    }
}

impl ScanOptions {
    pub fn is_bundle(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

/// Scan an installation directory
///
/// A missing directory yields an empty report.
pub fn scan_install_dir(dir: &Path, options: &ScanOptions) -> ScanReport {
    let mut report = ScanReport::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("Install directory {} does not exist", dir.display());
            return report;
        }
        Err(e) => {
            report.failures.push(ScanFailure {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            });
            return report;
        }
    };

    // Sorted so duplicate resolution does not depend on directory order
    let mut bundles: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && options.is_bundle(p))
        .filter(|p| {
            !p.file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true)
        })
        .collect();
    bundles.sort();

    for path in bundles {
        match read_bundle_info(&path) {
            Ok(info) => {
                tracing::debug!("Scanned {} ({})", path.display(), info.identifier);
                report.insert(InstalledRecord::from_info(path, info), options.include_prereleases);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                let reason = match e {
                    FairError::BundleMetadata { reason, .. } => reason,
                    other => other.to_string(),
                };
                report.failures.push(ScanFailure { path, reason });
            }
        }
    }

    report
}

/// [`scan_install_dir`] on the blocking thread pool
pub async fn scan_install_dir_async(dir: PathBuf, options: ScanOptions) -> ScanReport {
    let fallback_dir = dir.clone();
    tokio::task::spawn_blocking(move || scan_install_dir(&dir, &options))
        .await
        .unwrap_or_else(|e| ScanReport {
            installed: BTreeMap::new(),
            failures: vec![ScanFailure {
                path: fallback_dir,
                reason: format!("scan task failed: {e}"),
            }],
        })
}
