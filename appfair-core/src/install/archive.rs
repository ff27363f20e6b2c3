//! Zip extraction and bundle discovery

use std::ffi::OsString;
use std::fs::File;
use std::path::{Component, Path, PathBuf};

use crate::error::{FairError, Result};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Symlink hops followed while resolving a link target
const MAX_LINK_HOPS: u32 = 40;

/// Extract a zip archive into `dest`
///
/// Entries whose names escape `dest` are rejected, as are entries that would
/// be written through a symlink the archive created. Once everything is
/// extracted, every symlink is resolved against the extracted tree and must
/// land inside `dest`. Unix permissions and symlinks are restored where the
/// archive records them.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let archive_err = |reason: String| FairError::Archive {
        path: archive_path.to_path_buf(),
        reason,
    };

    let file = File::open(archive_path)
        .map_err(|e| FairError::io("Failed to open archive", archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_err(e.to_string()))?;

    std::fs::create_dir_all(dest)
        .map_err(|e| FairError::io("Failed to create extraction directory", dest, e))?;

    let mut links: Vec<PathBuf> = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| archive_err(e.to_string()))?;

        let relative = entry
            .enclosed_name()
            .ok_or_else(|| archive_err(format!("unsafe entry path '{}'", entry.name())))?;
        let out_path = dest.join(&relative);
        let mode = entry.unix_mode();
        let is_link = mode.map(|m| m & S_IFMT == S_IFLNK).unwrap_or(false);

        // A link entry may not sit below another link; anything else may not
        // be a link or sit below one.
        let checked = if is_link {
            relative.parent().unwrap_or(Path::new(""))
        } else {
            relative.as_path()
        };
        if let Some(link) = first_link(dest, checked) {
            return Err(archive_err(format!(
                "entry '{}' passes through symlink '{}'",
                entry.name(),
                link.display()
            )));
        }

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| FairError::io("Failed to create directory", &out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FairError::io("Failed to create directory", parent, e))?;
        }

        if is_link {
            let mut target = String::new();
            std::io::Read::read_to_string(&mut entry, &mut target)
                .map_err(|e| archive_err(format!("unreadable symlink '{}': {e}", entry.name())))?;
            if !link_stays_inside(dest, &relative, Path::new(&target)) {
                return Err(archive_err(format!(
                    "symlink '{}' points outside the archive",
                    entry.name()
                )));
            }
            create_symlink(&target, &out_path)?;
            links.push(relative);
            continue;
        }

        let mut outfile = File::create(&out_path)
            .map_err(|e| FairError::io("Failed to create file", &out_path, e))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| FairError::io("Failed to extract file", &out_path, e))?;

        if let Some(mode) = mode {
            set_mode(&out_path, mode)?;
        }
    }

    // Links created later can change where earlier ones resolve
    for link in &links {
        let target = std::fs::read_link(dest.join(link))
            .map_err(|e| FairError::io("Failed to read symlink", dest.join(link), e))?;
        if !link_stays_inside(dest, link, &target) {
            return Err(archive_err(format!(
                "symlink '{}' points outside the archive",
                link.display()
            )));
        }
    }

    tracing::debug!(
        "Extracted {} entries from {} into {}",
        archive.len(),
        archive_path.display(),
        dest.display()
    );
    Ok(())
}

/// First prefix of `relative` (including itself) that is a symlink under `root`
fn first_link(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut current = PathBuf::new();
    for component in relative.components() {
        current.push(component);
        let is_link = std::fs::symlink_metadata(root.join(&current))
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            return Some(current);
        }
    }
    None
}

/// Resolve a link target from the link's directory, following links already
/// on disk under `root`, and check that it never leaves `root`
fn link_stays_inside(root: &Path, link: &Path, target: &Path) -> bool {
    let mut stack: Vec<OsString> = link
        .parent()
        .map(|p| p.iter().map(|c| c.to_os_string()).collect())
        .unwrap_or_default();
    let mut hops = 0;
    resolve_within(root, &mut stack, target, &mut hops)
}

fn resolve_within(root: &Path, stack: &mut Vec<OsString>, target: &Path, hops: &mut u32) -> bool {
    for component in target.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return false;
                }
            }
            Component::Normal(name) => {
                stack.push(name.to_os_string());
                let here: PathBuf = root.join(stack.iter().collect::<PathBuf>());
                let is_link = std::fs::symlink_metadata(&here)
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false);
                if is_link {
                    *hops += 1;
                    if *hops > MAX_LINK_HOPS {
                        return false;
                    }
                    let Ok(next) = std::fs::read_link(&here) else {
                        return false;
                    };
                    stack.pop();
                    if !resolve_within(root, stack, &next, hops) {
                        return false;
                    }
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(unix)]
fn create_symlink(target: &str, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| FairError::io("Failed to create symlink", link, e))
}

#[cfg(not(unix))]
fn create_symlink(target: &str, link: &Path) -> Result<()> {
    std::fs::write(link, target).map_err(|e| FairError::io("Failed to create file", link, e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| FairError::io("Failed to set permissions", path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Top-level bundles in an extraction directory
///
/// `__MACOSX` resource-fork folders and dotfiles are ignored.
pub fn find_bundles(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| FairError::io("Failed to read extraction directory", dir, e))?;

    let mut bundles: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            !name.starts_with('.') && name != "__MACOSX"
        })
        .filter(|p| {
            p.is_dir()
                && p.extension()
                    .map(|ext| {
                        let ext = ext.to_string_lossy();
                        extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
                    })
                    .unwrap_or(false)
        })
        .collect();

    bundles.sort();
    Ok(bundles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    /// Entry in a test archive: path and contents; a trailing `/` makes a directory
    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o755);

        for (name, contents) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(contents).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_and_find_single_bundle() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("Foo.zip");
        write_zip(
            &archive,
            &[
                ("Foo.app/", b""),
                ("Foo.app/Contents/Info.plist", b"<plist/>"),
                ("Foo.app/Contents/MacOS/Foo", b"#!/bin/sh\n"),
                ("__MACOSX/Foo.app/._Info.plist", b"junk"),
                (".DS_Store", b"junk"),
            ],
        );

        let out = temp.path().join("out");
        extract_zip(&archive, &out).unwrap();

        let bundles = find_bundles(&out, &["app".to_string()]).unwrap();
        assert_eq!(bundles, vec![out.join("Foo.app")]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(out.join("Foo.app/Contents/MacOS/Foo"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_rejects_escaping_entry() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[("../evil.txt", b"x")]);

        let err = extract_zip(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, FairError::Archive { .. }));
        assert!(!temp.path().join("evil.txt").exists());
    }

    #[test]
    fn test_not_a_zip() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.zip");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_zip(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, FairError::Archive { .. }));
    }

    /// Entries are `(name, target)` symlinks followed by `(name, contents)` files
    fn write_zip_with_links(path: &Path, links: &[(&str, &str)], files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, target) in links {
            zip.add_symlink(*name, *target, options).unwrap();
        }
        for (name, contents) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_link_containment() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let link = Path::new("Foo.app/Contents/Frameworks/X.framework/Current");
        assert!(link_stays_inside(root, link, Path::new("Versions/A")));
        assert!(link_stays_inside(root, link, Path::new("../../MacOS/Foo")));
        assert!(!link_stays_inside(root, link, Path::new("../../../../../etc")));
        assert!(!link_stays_inside(root, link, Path::new("/etc/passwd")));
    }

    #[cfg(unix)]
    #[test]
    fn test_link_resolution_follows_links_on_disk() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::os::unix::fs::symlink("..", root.join("a/up")).unwrap();

        // Lexically inside, but `up` already climbs to the root
        assert!(!link_stays_inside(root, Path::new("a/x"), Path::new("up/..")));
        assert!(link_stays_inside(root, Path::new("a/x"), Path::new("up/a")));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_write_through_chained_links() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("chain.zip");
        write_zip_with_links(
            &archive,
            &[("a/l1", ".."), ("a/l1/l2", "..")],
            &[("a/l1/l2/escaped.txt", b"x")],
        );

        let scratch = temp.path().join("scratch");
        let out = scratch.join("out");
        let err = extract_zip(&archive, &out).unwrap_err();

        assert!(matches!(err, FairError::Archive { .. }));
        assert!(!scratch.join("escaped.txt").exists());
        assert!(!out.join("escaped.txt").exists());
        assert!(!out.join("l2").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_link_made_unsafe_by_later_link() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("late.zip");
        // `x` looks contained until `l1` turns out to point at `a` itself
        write_zip_with_links(&archive, &[("a/x", "l1/../.."), ("a/l1", ".")], &[]);

        let err = extract_zip(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, FairError::Archive { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_framework_links_are_kept() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("Foo.zip");
        write_zip_with_links(
            &archive,
            &[
                ("Foo.app/Contents/Frameworks/X.framework/Versions/Current", "A"),
                ("Foo.app/Contents/Frameworks/X.framework/X", "Versions/Current/X"),
            ],
            &[("Foo.app/Contents/Frameworks/X.framework/Versions/A/X", b"lib")],
        );

        let out = temp.path().join("out");
        extract_zip(&archive, &out).unwrap();
        let lib = out.join("Foo.app/Contents/Frameworks/X.framework/X");
        assert_eq!(std::fs::read(lib).unwrap(), b"lib");
    }
}
