//! Catalog item model
//!
//! Two sources feed the catalog: the first-party fairapps document and the
//! Homebrew cask API. Both are normalised behind [`CatalogItem`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::version::AppVersion;

/// Which catalog an item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSource {
    Fair,
    Cask,
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSource::Fair => f.write_str("fair"),
            CatalogSource::Cask => f.write_str("cask"),
        }
    }
}

/// A fairapps catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCatalogItem {
    /// App name; the bundle is expected to be `<name>.app`
    pub name: String,

    pub bundle_identifier: String,

    #[serde(default)]
    pub subtitle: Option<String>,

    #[serde(default)]
    pub developer_name: Option<String>,

    #[serde(default)]
    pub localized_description: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub version_date: Option<String>,

    #[serde(rename = "downloadURL")]
    pub download_url: String,

    #[serde(default, rename = "iconURL")]
    pub icon_url: Option<String>,

    #[serde(default, rename = "screenshotURLs")]
    pub screenshot_urls: Vec<String>,

    /// Download size in bytes
    #[serde(default)]
    pub size: Option<u64>,

    /// Fairseal: hex SHA-256 of the download
    #[serde(default)]
    pub sha256: Option<String>,

    #[serde(default)]
    pub beta: bool,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub homepage: Option<String>,
}

/// A Homebrew cask definition (subset of the JSON API)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaskItem {
    pub token: String,

    #[serde(default)]
    pub full_token: Option<String>,

    #[serde(default)]
    pub tap: Option<String>,

    /// Display names; the first one is used
    #[serde(default)]
    pub name: Vec<String>,

    #[serde(default)]
    pub desc: Option<String>,

    #[serde(default)]
    pub homepage: Option<String>,

    pub url: String,

    pub version: String,

    /// Hex SHA-256 or the literal `no_check`
    #[serde(default)]
    pub sha256: Option<String>,

    #[serde(default)]
    pub auto_updates: Option<bool>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub disabled: bool,
}

/// Marker Homebrew uses for casks without a fixed checksum
pub const CASK_NO_CHECK: &str = "no_check";

impl CaskItem {
    /// Checksum, unless the cask opts out with `no_check`
    pub fn checksum(&self) -> Option<&str> {
        self.sha256
            .as_deref()
            .filter(|s| !s.is_empty() && *s != CASK_NO_CHECK)
    }

    /// Homebrew versions look like `1.2.3,4567`; keep the first part
    pub fn display_version(&self) -> &str {
        self.version.split(',').next().unwrap_or(&self.version)
    }
}

/// A catalog entry from either source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum CatalogItem {
    Fair(AppCatalogItem),
    Cask(CaskItem),
}

impl CatalogItem {
    pub fn source(&self) -> CatalogSource {
        match self {
            CatalogItem::Fair(_) => CatalogSource::Fair,
            CatalogItem::Cask(_) => CatalogSource::Cask,
        }
    }

    /// Bundle identifier for fairapps, token for casks
    pub fn id(&self) -> &str {
        match self {
            CatalogItem::Fair(item) => &item.bundle_identifier,
            CatalogItem::Cask(item) => &item.token,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CatalogItem::Fair(item) => &item.name,
            CatalogItem::Cask(item) => item.name.first().unwrap_or(&item.token),
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            CatalogItem::Fair(item) => item.version.as_deref(),
            CatalogItem::Cask(item) => Some(item.display_version()),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            CatalogItem::Fair(item) => item
                .subtitle
                .as_deref()
                .or(item.localized_description.as_deref()),
            CatalogItem::Cask(item) => item.desc.as_deref(),
        }
    }

    pub fn download_url(&self) -> &str {
        match self {
            CatalogItem::Fair(item) => &item.download_url,
            CatalogItem::Cask(item) => &item.url,
        }
    }

    pub fn sha256(&self) -> Option<&str> {
        match self {
            CatalogItem::Fair(item) => item.sha256.as_deref(),
            CatalogItem::Cask(item) => item.checksum(),
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            CatalogItem::Fair(item) => item.size,
            CatalogItem::Cask(_) => None,
        }
    }

    pub fn categories(&self) -> &[String] {
        match self {
            CatalogItem::Fair(item) => &item.categories,
            CatalogItem::Cask(_) => &[],
        }
    }

    /// Beta flag or a prerelease version tag
    pub fn is_prerelease(&self) -> bool {
        let tagged = self
            .version()
            .map(|v| AppVersion::parse(v).is_prerelease())
            .unwrap_or(false);
        match self {
            CatalogItem::Fair(item) => item.beta || tagged,
            CatalogItem::Cask(_) => tagged,
        }
    }

    /// Case-insensitive match on name, id, description and categories
    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.name().to_lowercase().contains(&q)
            || self.id().to_lowercase().contains(&q)
            || self
                .description()
                .map(|d| d.to_lowercase().contains(&q))
                .unwrap_or(false)
            || self.categories().iter().any(|c| c.to_lowercase().contains(&q))
    }
}
