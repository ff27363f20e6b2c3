//! appfair configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. `APPFAIR_*` environment variables
//! 2. `~/.config/appfair/config.yaml` (or the path given with `--config`)
//! 3. Built-in defaults
//!
//! ```yaml
//! catalog_url: https://appfair.net/fairapps-macos.json
//! install_dir: /Applications
//! include_prereleases: false
//! brew:
//!   root: /opt/homebrew
//!   quarantine: false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default fairapps catalog for this platform
#[cfg(target_os = "macos")]
pub const DEFAULT_CATALOG_URL: &str = "https://appfair.net/fairapps-macos.json";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_CATALOG_URL: &str = "https://appfair.net/fairapps-linux.json";

/// Homebrew's full cask list
pub const DEFAULT_CASK_CATALOG_URL: &str = "https://formulae.brew.sh/api/cask.json";

/// Per-cask info endpoint; `{token}` is substituted
pub const DEFAULT_CASK_INFO_URL: &str = "https://formulae.brew.sh/api/cask/{token}.json";

/// Default catalog cache TTL (15 minutes)
pub const DEFAULT_CATALOG_TTL_SECS: u64 = 15 * 60;

/// Default quiet period before a watcher-triggered rescan
pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 2_000;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FairConfig {
    /// URL of the fairapps catalog (http, https or file)
    pub catalog_url: String,

    /// URL of the Homebrew cask list
    pub cask_catalog_url: String,

    /// URL template for a single cask's metadata
    pub cask_info_url: String,

    /// Directory bundles are installed into
    pub install_dir: PathBuf,

    /// Where replaced or removed bundles are moved
    pub trash_dir: PathBuf,

    /// Catalog cache and download scratch space
    pub cache_dir: PathBuf,

    /// How long a cached catalog stays fresh
    pub catalog_ttl_secs: u64,

    /// Prefer beta releases when they are newer
    pub include_prereleases: bool,

    /// Bundle extensions recognised by the scanner (without the dot)
    pub bundle_extensions: Vec<String>,

    /// Quiet period before the watcher requests a rescan
    pub watch_debounce_ms: u64,

    /// Homebrew bridge settings
    pub brew: BrewConfig,
}

/// Policy flags for the Homebrew bridge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrewConfig {
    /// Homebrew prefix containing `bin/brew` and `Caskroom/`
    pub root: PathBuf,

    /// Homebrew's cache; prefetched artifacts go in `downloads/`
    pub cache: PathBuf,

    /// Pass `--force` to install and upgrade
    pub force: bool,

    /// Leave the quarantine attribute on installed apps
    pub quarantine: bool,

    /// Refuse casks without a checksum
    pub require_sha: bool,

    /// Set `HOMEBREW_NO_ANALYTICS`
    pub disable_analytics: bool,

    /// Set `HOMEBREW_NO_AUTO_UPDATE`
    pub disable_auto_update: bool,

    /// Route sudo prompts through a generated askpass helper
    pub use_askpass: bool,
}

impl Default for BrewConfig {
    fn default() -> Self {
        Self {
            root: default_brew_root(),
            cache: default_brew_cache(),
            force: false,
            quarantine: true,
            require_sha: false,
            disable_analytics: true,
            disable_auto_update: true,
            use_askpass: true,
        }
    }
}

impl Default for FairConfig {
    fn default() -> Self {
        let cache_dir = default_cache_dir();
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            cask_catalog_url: DEFAULT_CASK_CATALOG_URL.to_string(),
            cask_info_url: DEFAULT_CASK_INFO_URL.to_string(),
            install_dir: default_install_dir(),
            trash_dir: default_trash_dir(&cache_dir),
            cache_dir,
            catalog_ttl_secs: DEFAULT_CATALOG_TTL_SECS,
            include_prereleases: false,
            bundle_extensions: vec!["app".to_string()],
            watch_debounce_ms: DEFAULT_WATCH_DEBOUNCE_MS,
            brew: BrewConfig::default(),
        }
    }
}

impl FairConfig {
    /// Load from the default location with environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::default_config_path()?;
        Self::load_from_path(&path)
    }

    /// Load from a specific path with environment overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_yaml_ng::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            FairConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = directories::ProjectDirs::from("net", "appfair", "appfair")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .or_else(|| dirs::config_dir().map(|d| d.join("appfair")))
            .context("Could not determine config directory")?;

        Ok(config_dir.join("config.yaml"))
    }

    /// Apply `APPFAIR_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("APPFAIR_INSTALL_DIR") {
            self.install_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("APPFAIR_CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("APPFAIR_TRASH_DIR") {
            self.trash_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("APPFAIR_CATALOG_URL") {
            self.catalog_url = v;
        }
        if let Some(v) = lookup("APPFAIR_CASK_CATALOG_URL") {
            self.cask_catalog_url = v;
        }
        if let Some(v) = lookup("APPFAIR_BREW_ROOT") {
            self.brew.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("APPFAIR_PRERELEASES") {
            self.include_prereleases = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    /// Reject settings that would make every operation fail later
    pub fn validate(&self) -> Result<()> {
        for (field, url) in [
            ("catalog_url", &self.catalog_url),
            ("cask_catalog_url", &self.cask_catalog_url),
            ("cask_info_url", &self.cask_info_url),
        ] {
            if !is_supported_url(url) {
                anyhow::bail!("{field} must start with http://, https:// or file:// (got '{url}')");
            }
        }

        if !self.cask_info_url.contains("{token}") {
            anyhow::bail!("cask_info_url must contain a {{token}} placeholder");
        }

        if self.bundle_extensions.is_empty() {
            anyhow::bail!("bundle_extensions must list at least one extension");
        }

        Ok(())
    }

    /// Catalog cache TTL as a duration
    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    /// Watcher debounce as a duration
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Directory catalog documents are cached in
    pub fn catalog_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("catalogs")
    }

    /// Directory downloads are staged in
    pub fn download_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }
}

/// Per-token cask metadata URL from a `{token}` template
pub fn cask_info_url(template: &str, token: &str) -> String {
    template.replace("{token}", token)
}

fn is_supported_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("file://")
}

fn default_install_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Applications")
    } else {
        dirs::home_dir()
            .map(|h| h.join("Applications"))
            .unwrap_or_else(|| PathBuf::from("Applications"))
    }
}

fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("net", "appfair", "appfair")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .or_else(|| dirs::cache_dir().map(|d| d.join("appfair")))
        .unwrap_or_else(|| std::env::temp_dir().join("appfair"))
}

fn default_trash_dir(cache_dir: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".Trash");
        }
    }
    dirs::data_local_dir()
        .map(|d| d.join("Trash").join("files"))
        .unwrap_or_else(|| cache_dir.join("trash"))
}

fn default_brew_root() -> PathBuf {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        PathBuf::from("/opt/homebrew")
    } else if cfg!(target_os = "macos") {
        PathBuf::from("/usr/local")
    } else {
        PathBuf::from("/home/linuxbrew/.linuxbrew")
    }
}

fn default_brew_cache() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("Homebrew"))
        .unwrap_or_else(|| std::env::temp_dir().join("Homebrew"))
}

impl BrewConfig {
    /// Path of the `brew` executable
    pub fn brew_path(&self) -> PathBuf {
        self.root.join("bin").join("brew")
    }
}
