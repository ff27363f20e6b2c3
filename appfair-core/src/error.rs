//! Error taxonomy for catalog, scan, install and brew operations
//!
//! Every failure an operation can hit has its own variant so callers can
//! match on it. Cancellation is an error like any other on the way up, but
//! [`ErrorQueue`] drops it before anything is shown to the user.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by appfair operations
#[derive(Error, Debug)]
pub enum FairError {
    /// Transport-level failure talking to a catalog or download host
    #[error("Network request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Catalog or cask document could not be decoded
    #[error("Failed to decode {what} from {url}: {reason}")]
    Decode {
        what: String,
        url: String,
        reason: String,
    },

    /// The operation was cancelled by the user
    #[error("Operation cancelled")]
    Cancelled,

    /// Downloaded bytes do not hash to the declared fairseal
    #[error("Invalid fairseal for {name}\n\nExpected sha256: {expected}\nActual sha256:   {actual}\n\nThe download does not match the catalog. Nothing was installed.")]
    InvalidFairseal {
        name: String,
        expected: String,
        actual: String,
    },

    /// The catalog did not declare a checksum for an item that requires one
    #[error("No fairseal declared for {name}; refusing to install an unverified download")]
    MissingFairseal { name: String },

    /// The archive did not contain exactly one top-level bundle
    #[error("Expected exactly one app bundle in the archive for {name}, found {found}")]
    ArchiveShape { name: String, found: usize },

    /// The archive could not be read or extracted
    #[error("Failed to extract archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    /// The extracted bundle is named differently from the catalog entry
    #[error("Bundle name mismatch: expected {expected}, found {found}")]
    BundleNameMismatch { expected: String, found: String },

    /// A bundle's Info.plist is missing or unusable
    #[error("Invalid bundle metadata at {path}: {reason}")]
    BundleMetadata { path: PathBuf, reason: String },

    /// No catalog item or installed bundle with this identifier
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    /// The configured brew executable does not exist
    #[error("No such file: {path}\n\nHomebrew was not found. Install it or set brew.root in the appfair config.")]
    PackageManagerMissing { path: PathBuf },

    /// The external package manager exited unsuccessfully
    #[error("{command} failed (exit code {code:?}):\n{output}")]
    ExternalProcess {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// Local file system failure
    #[error("{context}: {path}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for appfair operations
pub type Result<T, E = FairError> = std::result::Result<T, E>;

impl FairError {
    /// Build an [`FairError::Io`] with a short description of what was attempted
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FairError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Whether this error represents a user-initiated abort
    pub fn is_cancellation(&self) -> bool {
        match self {
            FairError::Cancelled => true,
            FairError::Io { source, .. } => source.kind() == std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }

    /// Whether re-running the same operation could succeed
    ///
    /// Only transport problems qualify. Integrity and shape errors will fail
    /// the same way again and must not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FairError::Network { .. } | FairError::HttpStatus { .. }
        )
    }

    /// Log integrity failures at error level under the `security` target
    pub fn log_if_security_critical(&self) {
        if let FairError::InvalidFairseal { .. } = self {
            tracing::error!(target: "security", "FAIRSEAL VIOLATION: {}", self);
        }
    }
}

/// User-visible error list
///
/// Cancellations are silently absorbed so that an aborted or superseded
/// operation does not produce an error dialog.
#[derive(Debug, Default)]
pub struct ErrorQueue {
    errors: Vec<FairError>,
}

impl ErrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error; returns false if it was a cancellation and was dropped
    pub fn push(&mut self, error: FairError) -> bool {
        if error.is_cancellation() {
            tracing::debug!("Absorbed cancellation");
            return false;
        }
        error.log_if_security_critical();
        self.errors.push(error);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FairError> {
        self.errors.iter()
    }

    /// Remove and return every queued error
    pub fn drain(&mut self) -> Vec<FairError> {
        std::mem::take(&mut self.errors)
    }
}
