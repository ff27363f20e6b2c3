//! Moving bundles out of the way without deleting them

use chrono::Local;
use std::path::{Path, PathBuf};

use crate::error::{FairError, Result};

/// Move `path` into `trash_dir`, returning its new location
///
/// If the trash already holds an item with the same name, a timestamp is
/// appended to the stem (`Foo 2024-05-01 10.42.07.app`).
pub fn move_to_trash(path: &Path, trash_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(trash_dir)
        .map_err(|e| FairError::io("Failed to create trash directory", trash_dir, e))?;

    let file_name = path.file_name().ok_or_else(|| FairError::NotFound {
        what: "bundle",
        id: path.display().to_string(),
    })?;

    let mut dest = trash_dir.join(file_name);
    if dest.exists() {
        let stamp = Local::now().format("%Y-%m-%d %H.%M.%S").to_string();
        dest = trash_dir.join(timestamped_name(path, &stamp));
        let mut n = 2;
        while dest.exists() {
            dest = trash_dir.join(timestamped_name(path, &format!("{stamp} {n}")));
            n += 1;
        }
    }

    move_path(path, &dest)?;
    tracing::info!("Moved {} to {}", path.display(), dest.display());
    Ok(dest)
}

fn timestamped_name(path: &Path, stamp: &str) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem} {stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem} {stamp}"),
    }
}

/// Rename, falling back to copy and remove across file systems
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tracing::debug!("Cross-device move of {}; copying", from.display());
            copy_then_remove(from, to)
        }
        Err(e) => Err(FairError::io("Failed to move", from, e)),
    }
}

/// Copy `from` to `to` and remove the source
///
/// A failed copy removes whatever part of `to` was written and leaves
/// `from` in place.
fn copy_then_remove(from: &Path, to: &Path) -> Result<()> {
    if let Err(e) = copy_tree(from, to) {
        if std::fs::symlink_metadata(to).is_ok() {
            if let Err(cleanup) = remove_path(to) {
                tracing::warn!("Could not remove partial copy {}: {}", to.display(), cleanup);
            }
        }
        return Err(e);
    }
    remove_path(from)
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        std::fs::copy(from, to).map_err(|e| FairError::io("Failed to copy", from, e))?;
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| from.to_path_buf());
            FairError::io("Failed to walk", path, std::io::Error::other(e.to_string()))
        })?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| FairError::io("Failed to create directory", &target, e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)
                .map_err(|e| FairError::io("Failed to copy", entry.path(), e))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let points_to =
        std::fs::read_link(link).map_err(|e| FairError::io("Failed to read symlink", link, e))?;
    std::os::unix::fs::symlink(points_to, target)
        .map_err(|e| FairError::io("Failed to create symlink", target, e))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    std::fs::copy(link, target)
        .map(|_| ())
        .map_err(|e| FairError::io("Failed to copy", link, e))
}

pub(crate) fn remove_path(path: &Path) -> Result<()> {
    let is_dir = std::fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false);
    let result = if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| FairError::io("Failed to remove", path, e))
}
