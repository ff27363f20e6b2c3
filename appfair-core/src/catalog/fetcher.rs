//! Catalog fetching with a disk cache
//!
//! Catalogs are fetched over HTTP (or read from a `file://` URL), decoded,
//! and cached on disk for `catalog_ttl_secs` so that repeated CLI invocations
//! do not hit the network every time.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::{AppCatalogItem, CaskItem, CatalogItem, CatalogSource};
use crate::config::FairConfig;
use crate::error::{FairError, Result};

/// Whether a fresh disk cache entry may satisfy a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    UseCache,
    Reload,
}

/// Cached catalog document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCatalog {
    /// When the catalog was cached (Unix timestamp)
    cached_at: u64,
    url: String,
    items: Vec<CatalogItem>,
}

/// Object form of the fairapps document
#[derive(Debug, Deserialize)]
struct FairCatalogDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    identifier: Option<String>,
    apps: Vec<AppCatalogItem>,
}

/// Build the shared HTTP client
pub(crate) fn http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder =
        reqwest::Client::builder().user_agent(concat!("appfair/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|source| FairError::Network {
        url: String::from("<client>"),
        source,
    })
}

/// Local path for a `file://` URL
pub(crate) fn file_url_path(url: &str) -> Option<PathBuf> {
    url.strip_prefix("file://").map(PathBuf::from)
}

/// Fetches and caches catalog documents
#[derive(Debug, Clone)]
pub struct CatalogFetcher {
    client: reqwest::Client,
    cache_dir: PathBuf,
    ttl: Duration,
}

impl CatalogFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(Some(Duration::from_secs(30)))?,
            cache_dir: cache_dir.into(),
            ttl,
        })
    }

    pub fn from_config(config: &FairConfig) -> Result<Self> {
        Self::new(config.catalog_cache_dir(), config.catalog_ttl())
    }

    /// Fetch and decode a catalog
    ///
    /// With [`CachePolicy::UseCache`] a cache entry younger than the TTL is
    /// returned without touching the network.
    pub async fn fetch(
        &self,
        source: CatalogSource,
        url: &str,
        policy: CachePolicy,
    ) -> Result<Vec<CatalogItem>> {
        if policy == CachePolicy::UseCache {
            if let Some(items) = self.load_cached(url) {
                return Ok(items);
            }
        }

        let body = self.fetch_bytes(url).await?;
        let items = decode_catalog(source, &body, url)?;
        tracing::info!("Fetched {} {} catalog items from {}", items.len(), source, url);

        if file_url_path(url).is_none() {
            // Caching is best effort
            if let Err(e) = self.save_to_cache(url, &items) {
                tracing::warn!("Failed to save catalog to cache: {}", e);
            }
        }

        Ok(items)
    }

    /// Fetch one cask's metadata from the per-token endpoint
    pub async fn fetch_cask_info(&self, url: &str) -> Result<CaskItem> {
        let body = self.fetch_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| FairError::Decode {
            what: "cask info".to_string(),
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = file_url_path(url) {
            return tokio::fs::read(&path)
                .await
                .map_err(|e| FairError::io("Failed to read catalog file", path, e));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FairError::Network {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FairError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FairError::Network {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    /// Get cache file path for a URL
    fn cache_path_for_url(&self, url: &str) -> PathBuf {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let hash = hasher.finish();

        self.cache_dir.join(format!("catalog_{hash:016x}.json"))
    }

    fn load_cached(&self, url: &str) -> Option<Vec<CatalogItem>> {
        let cache_path = self.cache_path_for_url(url);
        let content = std::fs::read(&cache_path).ok()?;

        let cached: CachedCatalog = match serde_json::from_slice(&content) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::debug!("Ignoring unreadable cache {}: {}", cache_path.display(), e);
                return None;
            }
        };

        // Hash collision or stale file from another URL
        if cached.url != url {
            return None;
        }

        let age = Duration::from_secs(unix_now().saturating_sub(cached.cached_at));
        if age > self.ttl {
            tracing::debug!("Cache expired for {} (age: {:?})", url, age);
            return None;
        }

        tracing::debug!("Using cached catalog for {} (age: {:?})", url, age);
        Some(cached.items)
    }

    fn save_to_cache(&self, url: &str, items: &[CatalogItem]) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| FairError::io("Failed to create cache directory", &self.cache_dir, e))?;

        let cache_path = self.cache_path_for_url(url);
        let cached = CachedCatalog {
            cached_at: unix_now(),
            url: url.to_string(),
            items: items.to_vec(),
        };

        let content = serde_json::to_vec(&cached).map_err(|e| FairError::Decode {
            what: "catalog cache".to_string(),
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        write_atomic(&cache_path, &content)?;

        tracing::debug!("Saved catalog to cache: {}", cache_path.display());
        Ok(())
    }
}

/// Decode a catalog document for a source
pub fn decode_catalog(source: CatalogSource, body: &[u8], url: &str) -> Result<Vec<CatalogItem>> {
    let decode_err = |what: &str, e: serde_json::Error| FairError::Decode {
        what: what.to_string(),
        url: url.to_string(),
        reason: e.to_string(),
    };

    match source {
        CatalogSource::Fair => {
            let value: serde_json::Value =
                serde_json::from_slice(body).map_err(|e| decode_err("fairapps catalog", e))?;
            let apps: Vec<AppCatalogItem> = if value.is_array() {
                serde_json::from_value(value).map_err(|e| decode_err("fairapps catalog", e))?
            } else {
                let doc: FairCatalogDocument = serde_json::from_value(value)
                    .map_err(|e| decode_err("fairapps catalog", e))?;
                tracing::debug!(
                    "Catalog '{}' ({})",
                    doc.name.as_deref().unwrap_or("unnamed"),
                    doc.identifier.as_deref().unwrap_or("-")
                );
                doc.apps
            };
            Ok(apps.into_iter().map(CatalogItem::Fair).collect())
        }
        CatalogSource::Cask => {
            let casks: Vec<CaskItem> =
                serde_json::from_slice(body).map_err(|e| decode_err("cask catalog", e))?;
            Ok(casks.into_iter().map(CatalogItem::Cask).collect())
        }
    }
}

/// Write to a temp file in the same directory and rename over the target
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| FairError::io("Failed to create cache file", dir, e))?;
    tmp.write_all(content)
        .map_err(|e| FairError::io("Failed to write cache", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| FairError::io("Failed to write cache", path, e.error))?;
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FAIR_OBJECT: &str = r#"{
        "name": "App Fair",
        "identifier": "net.appfair",
        "apps": [
            {"name": "Foo", "bundleIdentifier": "app.Foo", "version": "1.0.0",
             "downloadURL": "https://example.com/Foo.zip", "sha256": "00"}
        ]
    }"#;

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    #[test]
    fn test_decode_object_and_array_forms() {
        let items = decode_catalog(CatalogSource::Fair, FAIR_OBJECT.as_bytes(), "x").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id(), "app.Foo");

        let array = r#"[{"name":"Bar","bundleIdentifier":"app.Bar","downloadURL":"https://e/b.zip"}]"#;
        let items = decode_catalog(CatalogSource::Fair, array.as_bytes(), "x").unwrap();
        assert_eq!(items[0].name(), "Bar");
    }

    #[test]
    fn test_decode_failure_names_url() {
        let err = decode_catalog(CatalogSource::Cask, b"{not json", "https://e/cask.json")
            .unwrap_err();
        match err {
            FairError::Decode { url, .. } => assert_eq!(url, "https://e/cask.json"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_file_url() {
        let temp = TempDir::new().unwrap();
        let catalog = temp.path().join("fairapps.json");
        std::fs::write(&catalog, FAIR_OBJECT).unwrap();

        let fetcher = CatalogFetcher::new(temp.path().join("cache"), Duration::from_secs(60)).unwrap();
        let items = fetcher
            .fetch(CatalogSource::Fair, &file_url(&catalog), CachePolicy::Reload)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        // Local files are never cached
        assert!(!temp.path().join("cache").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let fetcher = CatalogFetcher::new(temp.path(), Duration::from_secs(60)).unwrap();
        let err = fetcher
            .fetch(
                CatalogSource::Fair,
                &file_url(&temp.path().join("absent.json")),
                CachePolicy::UseCache,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FairError::Io { .. }));
    }

    #[test]
    fn test_cache_roundtrip_and_ttl() {
        let temp = TempDir::new().unwrap();
        let url = "https://example.com/fairapps.json";
        let items = decode_catalog(CatalogSource::Fair, FAIR_OBJECT.as_bytes(), url).unwrap();

        let fetcher = CatalogFetcher::new(temp.path(), Duration::from_secs(60)).unwrap();
        fetcher.save_to_cache(url, &items).unwrap();
        assert_eq!(fetcher.load_cached(url), Some(items.clone()));
        assert_eq!(fetcher.load_cached("https://example.com/other.json"), None);

        // Only the cache file itself is left behind
        let files: Vec<_> = std::fs::read_dir(temp.path()).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), fetcher.cache_path_for_url(url));
    }
}
