//! Streaming downloads with an incremental SHA-256

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{CancellationToken, Progress};
use crate::catalog::file_url_path;
use crate::error::{FairError, Result};

const FILE_CHUNK: usize = 64 * 1024;

/// A completed download
///
/// The file is removed when this value is dropped.
#[derive(Debug)]
pub struct Download {
    pub file: TempPath,
    /// Lowercase hex SHA-256 of the content
    pub sha256: String,
    pub bytes: u64,
}

impl Download {
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Keep the file at `dest` instead of deleting it on drop
    pub fn persist(self, dest: &Path) -> Result<PathBuf> {
        self.file
            .persist(dest)
            .map_err(|e| FairError::io("Failed to keep download", dest, e.error))?;
        Ok(dest.to_path_buf())
    }
}

/// Stream `url` into a temporary file under `dir`
///
/// Progress is advanced and the cancellation token checked once per chunk.
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    progress: &Progress,
    cancel: &CancellationToken,
) -> Result<Download> {
    cancel.check()?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| FairError::io("Failed to create download directory", dir, e))?;

    let temp = tempfile::Builder::new()
        .prefix("download-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| FairError::io("Failed to create download file", dir, e))?
        .into_temp_path();

    let mut out = tokio::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&temp)
        .await
        .map_err(|e| FairError::io("Failed to open download file", &*temp, e))?;

    let mut hasher = Sha256::new();
    let mut written: u64 = 0;
    progress.reset();

    let mut write_chunk = |chunk: &[u8]| {
        hasher.update(chunk);
        written += chunk.len() as u64;
        progress.advance(chunk.len() as u64);
    };

    if let Some(path) = file_url_path(url) {
        let mut input = tokio::fs::File::open(&path)
            .await
            .map_err(|e| FairError::io("Failed to open download source", &path, e))?;
        let len = input.metadata().await.ok().map(|m| m.len());
        progress.set_total(len);

        let mut buf = vec![0u8; FILE_CHUNK];
        loop {
            cancel.check()?;
            let n = input
                .read(&mut buf)
                .await
                .map_err(|e| FairError::io("Failed to read download source", &path, e))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])
                .await
                .map_err(|e| FairError::io("Failed to write download", &*temp, e))?;
            write_chunk(&buf[..n]);
        }
    } else {
        let mut response = client
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
        progress.set_total(response.content_length());

        loop {
            cancel.check()?;
            let chunk = response.chunk().await.map_err(|source| FairError::Network {
                url: url.to_string(),
                source,
            })?;
            let Some(chunk) = chunk else { break };
            out.write_all(&chunk)
                .await
                .map_err(|e| FairError::io("Failed to write download", &*temp, e))?;
            write_chunk(&chunk);
        }
    }

    out.flush()
        .await
        .map_err(|e| FairError::io("Failed to write download", &*temp, e))?;
    drop(out);

    let sha256 = hex::encode(hasher.finalize());
    tracing::debug!("Downloaded {} bytes from {} (sha256 {})", written, url, sha256);

    Ok(Download {
        file: temp,
        sha256,
        bytes: written,
    })
}

/// Canonical form of a declared digest: lowercase hex, no `sha256:` prefix
pub fn normalize_digest(digest: &str) -> String {
    let trimmed = digest.trim();
    let hex = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256:") => &trimmed[7..],
        _ => trimmed,
    };
    hex.to_ascii_lowercase()
}

/// Compare a download's digest against the declared fairseal
pub fn verify_fairseal(name: &str, expected: Option<&str>, actual: &str) -> Result<()> {
    let expected = expected
        .map(normalize_digest)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| FairError::MissingFairseal {
            name: name.to_string(),
        })?;

    if expected != normalize_digest(actual) {
        let err = FairError::InvalidFairseal {
            name: name.to_string(),
            expected,
            actual: actual.to_string(),
        };
        err.log_if_security_critical();
        return Err(err);
    }

    tracing::info!("Verified fairseal for {}: {}", name, expected);
    Ok(())
}
