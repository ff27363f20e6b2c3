//! In-memory catalog snapshots

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{CatalogItem, CatalogSource};

/// One source's items as of a fetch
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub items: Vec<CatalogItem>,
    pub fetched_at: DateTime<Utc>,
}

/// Holds the latest successfully decoded catalog for each source
///
/// A snapshot is only ever swapped whole; readers never see a partially
/// applied refresh.
#[derive(Debug, Default, Clone)]
pub struct CatalogStore {
    snapshots: BTreeMap<CatalogSource, CatalogSnapshot>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a source's items, returning the previous snapshot
    pub fn replace(
        &mut self,
        source: CatalogSource,
        items: Vec<CatalogItem>,
    ) -> Option<CatalogSnapshot> {
        tracing::debug!("Replacing {} catalog with {} items", source, items.len());
        self.snapshots.insert(
            source,
            CatalogSnapshot {
                items,
                fetched_at: Utc::now(),
            },
        )
    }

    pub fn items(&self, source: CatalogSource) -> &[CatalogItem] {
        self.snapshots
            .get(&source)
            .map(|s| s.items.as_slice())
            .unwrap_or(&[])
    }

    /// Items from every loaded source
    pub fn all(&self) -> impl Iterator<Item = &CatalogItem> {
        self.snapshots.values().flat_map(|s| s.items.iter())
    }

    /// Whether a source has been loaded at least once
    pub fn is_loaded(&self, source: CatalogSource) -> bool {
        self.snapshots.contains_key(&source)
    }

    pub fn fetched_at(&self, source: CatalogSource) -> Option<DateTime<Utc>> {
        self.snapshots.get(&source).map(|s| s.fetched_at)
    }

    pub fn count(&self, source: CatalogSource) -> usize {
        self.items(source).len()
    }

    /// Every entry carrying this identifier (betas share ids with releases)
    pub fn candidates(&self, source: CatalogSource, id: &str) -> Vec<&CatalogItem> {
        self.items(source)
            .iter()
            .filter(|item| item.id() == id)
            .collect()
    }

    pub fn get(&self, source: CatalogSource, id: &str) -> Option<&CatalogItem> {
        self.items(source).iter().find(|item| item.id() == id)
    }

    /// Search one source, or all of them when `source` is `None`
    pub fn search(&self, query: &str, source: Option<CatalogSource>) -> Vec<&CatalogItem> {
        let items: Box<dyn Iterator<Item = &CatalogItem> + '_> = match source {
            Some(source) => Box::new(self.items(source).iter()),
            None => Box::new(self.all()),
        };
        items.filter(|item| item.matches(query)).collect()
    }
}
