//! Shared fixtures for integration tests
//!
//! Everything is served from a temp directory through `file://` URLs, so no
//! test touches the network.

#![allow(dead_code)]

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use appfair_core::config::{BrewConfig, FairConfig};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn info_plist(identifier: &str, name: &str, version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>{identifier}</string>
	<key>CFBundleName</key>
	<string>{name}</string>
	<key>CFBundleShortVersionString</key>
	<string>{version}</string>
	<key>CFBundleVersion</key>
	<string>1</string>
</dict>
</plist>
"#
    )
}

/// Create `<dir>/<name>.app` with a valid Info.plist
pub fn write_bundle(dir: &Path, name: &str, identifier: &str, version: &str) -> PathBuf {
    let bundle = dir.join(format!("{name}.app"));
    let contents = bundle.join("Contents");
    std::fs::create_dir_all(contents.join("MacOS")).unwrap();
    std::fs::write(
        contents.join("Info.plist"),
        info_plist(identifier, name, version),
    )
    .unwrap();
    std::fs::write(contents.join("MacOS").join(name), b"#!/bin/sh\n").unwrap();
    bundle
}

/// Write a zip whose entries are `(name, contents)`; a trailing `/` makes a directory
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o755);

    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(name.trim_end_matches('/'), options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Zip containing a single well-formed `<name>.app`
pub fn bundle_zip(path: &Path, name: &str, identifier: &str, version: &str) {
    let plist = info_plist(identifier, name, version);
    let plist_path = format!("{name}.app/Contents/Info.plist");
    let exe_path = format!("{name}.app/Contents/MacOS/{name}");
    write_zip(
        path,
        &[
            (&plist_path, plist.as_bytes()),
            (&exe_path, b"#!/bin/sh\necho hi\n"),
        ],
    );
}

pub fn sha256_file(path: &Path) -> String {
    format!("{:x}", Sha256::digest(std::fs::read(path).unwrap()))
}

pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// A temp directory laid out as catalog host, install dir, trash and caches
pub struct Sandbox {
    pub temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        init_test_logging();
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn install_dir(&self) -> PathBuf {
        self.root().join("Applications")
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.root().join("Trash")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root().join("fairapps.json")
    }

    pub fn config(&self) -> FairConfig {
        FairConfig {
            catalog_url: file_url(&self.catalog_path()),
            cask_catalog_url: file_url(&self.root().join("cask.json")),
            cask_info_url: format!("file://{}/api/{{token}}.json", self.root().display()),
            install_dir: self.install_dir(),
            trash_dir: self.trash_dir(),
            cache_dir: self.root().join("cache"),
            brew: BrewConfig {
                root: self.root().join("brew"),
                cache: self.root().join("brew-cache"),
                ..BrewConfig::default()
            },
            ..FairConfig::default()
        }
    }

    /// Write the fairapps catalog with one entry per `(name, id, version, zip, sha256)`
    pub fn write_catalog(&self, apps: &[(&str, &str, &str, &Path, &str)]) {
        let apps: Vec<serde_json::Value> = apps
            .iter()
            .map(|(name, id, version, zip, sha)| {
                serde_json::json!({
                    "name": name,
                    "bundleIdentifier": id,
                    "version": version,
                    "downloadURL": file_url(zip),
                    "sha256": sha,
                })
            })
            .collect();
        let doc = serde_json::json!({
            "name": "App Fair",
            "identifier": "net.appfair.catalog",
            "apps": apps,
        });
        std::fs::write(self.catalog_path(), doc.to_string()).unwrap();
    }

    /// Names of the entries currently in the install directory
    pub fn installed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.install_dir()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}
