//! appfair core library
//!
//! Catalog fetching, installation scanning, reconciliation, fairseal-checked
//! installs and the Homebrew cask bridge behind the `appfair` CLI.

pub mod cask;
pub mod catalog;
pub mod config;
pub mod error;
pub mod install;
pub mod manager;
pub mod reconcile;
pub mod scan;
pub mod version;
pub mod watcher;

pub use error::{ErrorQueue, FairError, Result};
pub use manager::AppManager;
