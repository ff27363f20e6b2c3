//! Bundle installation from the fairapps catalog
//!
//! An install runs these steps in order, each with its own error:
//!
//! 1. stream the download into the cache directory
//! 2. check the SHA-256 against the catalog fairseal
//! 3. extract the zip into a scratch directory
//! 4. require exactly one top-level bundle named `<name>.<ext>`
//! 5. move any previous installation to the trash
//! 6. move the new bundle into the installation directory
//!
//! Nothing in the installation directory changes before step 5.

mod archive;
mod download;
mod progress;
mod trash;

use std::path::{Path, PathBuf};

pub use archive::{extract_zip, find_bundles};
pub use download::{download, normalize_digest, verify_fairseal, Download};
pub use progress::{CancellationToken, Progress};
pub use trash::{move_path, move_to_trash};
use trash::remove_path;

use crate::catalog::{http_client, AppCatalogItem};
use crate::config::FairConfig;
use crate::error::{FairError, Result};
use crate::scan::InstalledRecord;

/// Installs and trashes bundles
#[derive(Debug, Clone)]
pub struct Installer {
    client: reqwest::Client,
    install_dir: PathBuf,
    trash_dir: PathBuf,
    download_dir: PathBuf,
    extensions: Vec<String>,
}

impl Installer {
    pub fn new(
        install_dir: impl Into<PathBuf>,
        trash_dir: impl Into<PathBuf>,
        download_dir: impl Into<PathBuf>,
        extensions: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            // No overall timeout; large downloads are bounded by cancellation
            client: http_client(None)?,
            install_dir: install_dir.into(),
            trash_dir: trash_dir.into(),
            download_dir: download_dir.into(),
            extensions,
        })
    }

    pub fn from_config(config: &FairConfig) -> Result<Self> {
        Self::new(
            &config.install_dir,
            &config.trash_dir,
            config.download_dir(),
            config.bundle_extensions.clone(),
        )
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Install or update a bundle
    ///
    /// `previous` is the path of an existing installation of the same app, if
    /// the scanner found one; it is moved to the trash before the new bundle
    /// is put in place. Returns the installed path.
    pub async fn install(
        &self,
        item: &AppCatalogItem,
        previous: Option<&Path>,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        tracing::info!(
            "Downloading {} {} from {}",
            item.name,
            item.version.as_deref().unwrap_or("(unversioned)"),
            item.download_url
        );

        let artifact = download(
            &self.client,
            &item.download_url,
            &self.download_dir,
            progress,
            cancel,
        )
        .await?;

        verify_fairseal(&item.name, item.sha256.as_deref(), &artifact.sha256)?;
        cancel.check()?;

        let scratch = tempfile::Builder::new()
            .prefix("extract-")
            .tempdir_in(&self.download_dir)
            .map_err(|e| FairError::io("Failed to create scratch directory", &self.download_dir, e))?;

        let archive_path = artifact.path().to_path_buf();
        let scratch_path = scratch.path().to_path_buf();
        let extensions = self.extensions.clone();
        let bundles = tokio::task::spawn_blocking(move || {
            extract_zip(&archive_path, &scratch_path)?;
            find_bundles(&scratch_path, &extensions)
        })
        .await
        .map_err(|e| FairError::Archive {
            path: artifact.path().to_path_buf(),
            reason: format!("extraction task failed: {e}"),
        })??;

        // The payload is no longer needed once extracted
        drop(artifact);

        let bundle = match bundles.as_slice() {
            [bundle] => bundle.clone(),
            other => {
                return Err(FairError::ArchiveShape {
                    name: item.name.clone(),
                    found: other.len(),
                })
            }
        };

        let file_name = bundle
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = bundle
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let expected = format!("{}.{}", item.name, ext);
        if file_name != expected {
            return Err(FairError::BundleNameMismatch {
                expected,
                found: file_name,
            });
        }

        cancel.check()?;
        let dest = self.install_dir.join(&file_name);
        self.put_in_place(&bundle, &dest, previous)?;

        tracing::info!("Installed {} to {}", item.name, dest.display());
        Ok(dest)
    }

    /// Trash any previous installation, then move the new bundle to `dest`
    ///
    /// If the final move fails the trashed bundles are put back.
    fn put_in_place(&self, bundle: &Path, dest: &Path, previous: Option<&Path>) -> Result<()> {
        std::fs::create_dir_all(&self.install_dir)
            .map_err(|e| FairError::io("Failed to create install directory", &self.install_dir, e))?;

        let mut displaced: Vec<(PathBuf, PathBuf)> = Vec::new();
        let mut old_paths: Vec<&Path> = previous.into_iter().filter(|p| p.exists()).collect();
        if dest.exists() && !old_paths.contains(&dest) {
            old_paths.push(dest);
        }

        for old in old_paths {
            let trashed = move_to_trash(old, &self.trash_dir)?;
            displaced.push((old.to_path_buf(), trashed));
        }

        if let Err(e) = move_path(bundle, dest) {
            // Every previous occupant was trashed, so anything left is partial
            if std::fs::symlink_metadata(dest).is_ok() {
                if let Err(cleanup) = remove_path(dest) {
                    tracing::warn!("Could not remove partial {}: {}", dest.display(), cleanup);
                }
            }
            for (original, trashed) in displaced {
                if let Err(restore) = move_path(&trashed, &original) {
                    tracing::warn!("Could not restore {}: {}", original.display(), restore);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Move an installed bundle to the trash
    pub fn trash(&self, record: &InstalledRecord) -> Result<PathBuf> {
        if !record.path.exists() {
            return Err(FairError::NotFound {
                what: "installed bundle",
                id: record.path.display().to_string(),
            });
        }
        move_to_trash(&record.path, &self.trash_dir)
    }
}

/// Command that shows `path` in the platform file manager
pub fn reveal_command(path: &Path) -> (String, Vec<String>) {
    if cfg!(target_os = "macos") {
        (
            "open".to_string(),
            vec!["-R".to_string(), path.display().to_string()],
        )
    } else {
        let dir = path.parent().unwrap_or(path);
        ("xdg-open".to_string(), vec![dir.display().to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reveal_command_targets_path() {
        let (program, args) = reveal_command(Path::new("/Applications/Foo.app"));
        assert!(!program.is_empty());
        assert!(args.iter().any(|a| a.contains("Applications")));
    }

    fn installer(temp: &TempDir) -> Installer {
        Installer::new(
            temp.path().join("apps"),
            temp.path().join("trash"),
            temp.path().join("dl"),
            vec!["app".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_failed_move_restores_previous_bundle() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);
        let dest = temp.path().join("apps/Foo.app");
        std::fs::create_dir_all(dest.join("Contents")).unwrap();
        std::fs::write(dest.join("Contents/Info.plist"), b"old").unwrap();

        // The extracted bundle vanished, so the final move fails
        let missing = temp.path().join("scratch/Foo.app");
        let err = installer
            .put_in_place(&missing, &dest, Some(&dest))
            .unwrap_err();
        assert!(matches!(err, FairError::Io { .. }));

        assert_eq!(std::fs::read(dest.join("Contents/Info.plist")).unwrap(), b"old");
        let trashed = std::fs::read_dir(temp.path().join("trash")).unwrap().count();
        assert_eq!(trashed, 0);
    }

    #[test]
    fn test_put_in_place_replaces_previous_bundle() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);
        let dest = temp.path().join("apps/Foo.app");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("marker"), b"old").unwrap();

        let bundle = temp.path().join("scratch/Foo.app");
        std::fs::create_dir_all(&bundle).unwrap();
        std::fs::write(bundle.join("marker"), b"new").unwrap();

        installer.put_in_place(&bundle, &dest, None).unwrap();
        assert_eq!(std::fs::read(dest.join("marker")).unwrap(), b"new");
        assert_eq!(
            std::fs::read(temp.path().join("trash/Foo.app/marker")).unwrap(),
            b"old"
        );
    }

    #[test]
    fn test_trash_missing_bundle() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);

        let record = InstalledRecord {
            path: temp.path().join("apps/Gone.app"),
            bundle_id: "app.Gone".to_string(),
            name: "Gone".to_string(),
            version: None,
            build: None,
        };
        assert!(matches!(
            installer.trash(&record),
            Err(FairError::NotFound { .. })
        ));
    }
}
