//! App catalogs
//!
//! # Overview
//!
//! Two catalogs are supported:
//! - the fairapps JSON catalog published by the App Fair
//! - the Homebrew cask API
//!
//! # Architecture
//!
//! ```text
//! fairapps-macos.json   formulae.brew.sh/api/cask.json
//!          │                     │
//!          └──── CatalogFetcher ─┘   (disk cache, TTL)
//!                      │
//!                      ▼
//!               CatalogStore         (one snapshot per source)
//! ```

mod fetcher;
mod item;
mod store;

pub use fetcher::{decode_catalog, CachePolicy, CatalogFetcher};
pub(crate) use fetcher::{file_url_path, http_client};
pub use item::{AppCatalogItem, CaskItem, CatalogItem, CatalogSource, CASK_NO_CHECK};
pub use store::{CatalogSnapshot, CatalogStore};
