//! App manager
//!
//! [`AppManager`] owns the catalog snapshots, the last scan, the installed
//! casks and the user-visible error queue. It is built explicitly from a
//! [`FairConfig`]; there is no process-wide instance.
//!
//! Every mutating operation takes `&mut self` and rescans before returning,
//! so a scan never overlaps an install and callers always see fresh state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cask::{CaskAction, CaskBridge, CaskOperation, CaskPhase};
use crate::catalog::{CachePolicy, CatalogFetcher, CatalogItem, CatalogSource, CatalogStore};
use crate::config::FairConfig;
use crate::error::{ErrorQueue, FairError, Result};
use crate::install::{CancellationToken, Installer, Progress};
use crate::reconcile::{preferred_item, reconcile, AppInfo};
use crate::scan::{scan_caskroom, scan_install_dir_async, InstalledCask, ScanOptions, ScanReport};

pub struct AppManager {
    config: FairConfig,
    fetcher: CatalogFetcher,
    installer: Installer,
    bridge: CaskBridge,
    store: CatalogStore,
    report: ScanReport,
    casks: BTreeMap<String, InstalledCask>,
    errors: ErrorQueue,
    last_operation: Option<CaskOperation>,
}

impl AppManager {
    /// Build a manager with the default fetcher, installer and bridge
    pub fn new(config: FairConfig) -> Result<Self> {
        let fetcher = CatalogFetcher::from_config(&config)?;
        let installer = Installer::from_config(&config)?;
        let bridge = CaskBridge::from_config(&config)?;
        Ok(Self::with_parts(config, fetcher, installer, bridge))
    }

    pub fn with_parts(
        config: FairConfig,
        fetcher: CatalogFetcher,
        installer: Installer,
        bridge: CaskBridge,
    ) -> Self {
        Self {
            config,
            fetcher,
            installer,
            bridge,
            store: CatalogStore::new(),
            report: ScanReport::default(),
            casks: BTreeMap::new(),
            errors: ErrorQueue::new(),
            last_operation: None,
        }
    }

    pub fn config(&self) -> &FairConfig {
        &self.config
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn scan_report(&self) -> &ScanReport {
        &self.report
    }

    pub fn installed_casks(&self) -> &BTreeMap<String, InstalledCask> {
        &self.casks
    }

    pub fn bridge(&self) -> &CaskBridge {
        &self.bridge
    }

    fn catalog_url(&self, source: CatalogSource) -> &str {
        match source {
            CatalogSource::Fair => &self.config.catalog_url,
            CatalogSource::Cask => &self.config.cask_catalog_url,
        }
    }

    /// Fetch one catalog and swap it in
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh_catalog(
        &mut self,
        source: CatalogSource,
        policy: CachePolicy,
    ) -> Result<usize> {
        let url = self.catalog_url(source).to_string();
        let items = self.fetcher.fetch(source, &url, policy).await?;
        let count = items.len();
        self.store.replace(source, items);
        Ok(count)
    }

    /// Refresh each source, queueing failures instead of stopping
    pub async fn refresh_all(&mut self, sources: &[CatalogSource], policy: CachePolicy) -> usize {
        let mut total = 0;
        for &source in sources {
            match self.refresh_catalog(source, policy).await {
                Ok(count) => total += count,
                Err(e) => {
                    tracing::warn!("Failed to refresh {} catalog: {}", source, e);
                    self.errors.push(e);
                }
            }
        }
        total
    }

    /// Rebuild installed state from disk
    pub async fn rescan(&mut self) -> &ScanReport {
        let options = ScanOptions {
            extensions: self.config.bundle_extensions.clone(),
            include_prereleases: self.config.include_prereleases,
        };
        self.report = scan_install_dir_async(self.config.install_dir.clone(), options).await;

        let brew_root = self.config.brew.root.clone();
        self.casks = tokio::task::spawn_blocking(move || scan_caskroom(&brew_root))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Caskroom scan failed: {}", e);
                BTreeMap::new()
            });

        tracing::debug!(
            "Rescanned: {} bundles, {} failures, {} casks",
            self.report.installed.len(),
            self.report.failures.len(),
            self.casks.len()
        );
        &self.report
    }

    /// Reconciled rows for one source, or all loaded sources
    pub fn app_infos(&self, source: Option<CatalogSource>) -> Vec<AppInfo> {
        let items: Box<dyn Iterator<Item = &CatalogItem> + '_> = match source {
            Some(source) => Box::new(self.store.items(source).iter()),
            None => Box::new(self.store.all()),
        };
        reconcile(items, &self.report, &self.casks, self.config.include_prereleases)
    }

    /// Canonical catalog entry matching an identifier or, failing that, a name
    pub fn find_item(&self, source: CatalogSource, id_or_name: &str) -> Option<&CatalogItem> {
        let include = self.config.include_prereleases;
        preferred_item(self.store.candidates(source, id_or_name), include).or_else(|| {
            preferred_item(
                self.store
                    .items(source)
                    .iter()
                    .filter(|item| item.name().eq_ignore_ascii_case(id_or_name)),
                include,
            )
        })
    }

    /// Install or update a fairapps bundle, then rescan
    pub async fn install(
        &mut self,
        id: &str,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let item = match self.find_item(CatalogSource::Fair, id) {
            Some(CatalogItem::Fair(item)) => item.clone(),
            _ => {
                return Err(FairError::NotFound {
                    what: "catalog app",
                    id: id.to_string(),
                })
            }
        };

        let previous = self
            .report
            .get(&item.bundle_identifier)
            .map(|r| r.path.clone());

        let result = self
            .installer
            .install(&item, previous.as_deref(), progress, cancel)
            .await;
        self.rescan().await;
        result
    }

    /// Move an installed bundle to the trash, then rescan
    pub async fn trash(&mut self, id: &str) -> Result<PathBuf> {
        let record = self
            .report
            .find(id)
            .cloned()
            .ok_or_else(|| FairError::NotFound {
                what: "installed app",
                id: id.to_string(),
            })?;

        let result = self.installer.trash(&record);
        self.rescan().await;
        result
    }

    /// Run a cask operation through `brew`, then rescan
    pub async fn cask_operation(
        &mut self,
        action: CaskAction,
        token: &str,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<CaskOperation> {
        let mut op = CaskOperation::new(action, token);
        let result = self.bridge.run(&mut op, progress, cancel).await;
        self.rescan().await;

        let outcome = result.map(|output| {
            tracing::debug!("brew output for {}: {}", token, output.combined());
            op.advance(CaskPhase::Succeeded);
            tracing::info!("{} {} succeeded", action, token);
            op.clone()
        });
        self.last_operation = Some(op);
        outcome
    }

    pub fn last_cask_operation(&self) -> Option<&CaskOperation> {
        self.last_operation.as_ref()
    }

    /// Queue an error for the user; cancellations are dropped
    pub fn record_error(&mut self, error: FairError) -> bool {
        self.errors.push(error)
    }

    pub fn errors(&self) -> &ErrorQueue {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<FairError> {
        self.errors.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> FairConfig {
        let root = temp.path();
        FairConfig {
            catalog_url: format!("file://{}", root.join("fairapps.json").display()),
            cask_catalog_url: format!("file://{}", root.join("cask.json").display()),
            install_dir: root.join("Applications"),
            trash_dir: root.join("Trash"),
            cache_dir: root.join("cache"),
            ..FairConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        std::fs::write(
            temp.path().join("fairapps.json"),
            r#"[{"name":"Foo","bundleIdentifier":"app.Foo","version":"1.0","downloadURL":"file:///x.zip"}]"#,
        )
        .unwrap();

        let mut manager = AppManager::new(config).unwrap();
        assert_eq!(
            manager
                .refresh_catalog(CatalogSource::Fair, CachePolicy::Reload)
                .await
                .unwrap(),
            1
        );

        std::fs::write(temp.path().join("fairapps.json"), "{ broken").unwrap();
        let err = manager
            .refresh_catalog(CatalogSource::Fair, CachePolicy::Reload)
            .await
            .unwrap_err();
        assert!(matches!(err, FairError::Decode { .. }));
        assert_eq!(manager.store().count(CatalogSource::Fair), 1);

        // Missing cask catalog is queued, fair refresh still counted
        std::fs::write(
            temp.path().join("fairapps.json"),
            r#"{"name":"x","identifier":"y","apps":[]}"#,
        )
        .unwrap();
        let total = manager
            .refresh_all(&[CatalogSource::Fair, CatalogSource::Cask], CachePolicy::Reload)
            .await;
        assert_eq!(total, 0);
        assert_eq!(manager.errors().len(), 1);
        assert_eq!(manager.take_errors().len(), 1);
        assert!(manager.errors().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_install_id() {
        let temp = TempDir::new().unwrap();
        let mut manager = AppManager::new(config_in(&temp)).unwrap();
        let err = manager
            .install("app.Missing", &Progress::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FairError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_record_error_absorbs_cancel() {
        let temp = TempDir::new().unwrap();
        let mut manager = AppManager::new(config_in(&temp)).unwrap();
        assert!(!manager.record_error(FairError::Cancelled));
        assert!(manager.errors().is_empty());
    }
}
