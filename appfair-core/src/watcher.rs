//! Installation directory watcher
//!
//! File-system events arrive in bursts (an unzip touches hundreds of
//! files), so they are coalesced: one [`RescanRequest`] is emitted after the
//! directory has been quiet for the debounce period.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{FairError, Result};

/// A coalesced batch of changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescanRequest {
    /// Top-level entries of the watched directory that changed
    pub paths: Vec<PathBuf>,
    /// Raw events folded into this request
    pub events: usize,
}

/// Watches a directory until dropped
pub struct InstallWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    requests: mpsc::Receiver<RescanRequest>,
    dir: PathBuf,
}

impl InstallWatcher {
    /// Start watching `dir`; must be called inside a tokio runtime
    pub fn start(dir: &Path, debounce: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| FairError::io("Failed to create install directory", dir, e))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| watch_error(dir, e))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(dir, e))?;

        let (request_tx, requests) = mpsc::channel(8);
        let task = tokio::spawn(debounce_loop(dir.to_path_buf(), event_rx, request_tx, debounce));

        tracing::info!("Watching {} (debounce {:?})", dir.display(), debounce);
        Ok(Self {
            _watcher: watcher,
            task,
            requests,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait for the next rescan request; `None` once the watcher has stopped
    pub async fn next_rescan(&mut self) -> Option<RescanRequest> {
        self.requests.recv().await
    }
}

impl Drop for InstallWatcher {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!("Stopped watching {}", self.dir.display());
    }
}

fn watch_error(dir: &Path, e: notify::Error) -> FairError {
    FairError::io(
        "Failed to watch directory",
        dir,
        std::io::Error::other(e.to_string()),
    )
}

fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

/// Map a changed path to the top-level entry under `dir` it belongs to
fn top_level(dir: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(dir)
        .ok()
        .and_then(|rel| rel.components().next())
        .map(|first| dir.join(first))
        .unwrap_or_else(|| path.to_path_buf())
}

async fn debounce_loop(
    dir: PathBuf,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    requests: mpsc::Sender<RescanRequest>,
    debounce: Duration,
) {
    loop {
        let mut paths = BTreeSet::new();
        let mut count = 0usize;

        // Block until the first relevant event
        loop {
            match events.recv().await {
                Some(Ok(event)) if is_relevant(&event.kind) => {
                    count += 1;
                    paths.extend(event.paths.iter().map(|p| top_level(&dir, p)));
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => tracing::warn!("Watch error on {}: {}", dir.display(), e),
                None => return,
            }
        }

        // Then fold everything until the directory is quiet
        let mut closed = false;
        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(Ok(event))) => {
                    if is_relevant(&event.kind) {
                        count += 1;
                        paths.extend(event.paths.iter().map(|p| top_level(&dir, p)));
                    }
                }
                Ok(Some(Err(e))) => tracing::warn!("Watch error on {}: {}", dir.display(), e),
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        tracing::debug!("{} events in {}; requesting rescan", count, dir.display());
        let request = RescanRequest {
            paths: paths.into_iter().collect(),
            events: count,
        };
        if requests.send(request).await.is_err() || closed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_top_level() {
        let dir = Path::new("/Applications");
        assert_eq!(
            top_level(dir, Path::new("/Applications/Foo.app/Contents/Info.plist")),
            PathBuf::from("/Applications/Foo.app")
        );
        assert_eq!(
            top_level(dir, Path::new("/elsewhere/x")),
            PathBuf::from("/elsewhere/x")
        );
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_request() {
        let temp = TempDir::new().unwrap();
        let mut watcher = InstallWatcher::start(temp.path(), Duration::from_millis(300)).unwrap();

        for i in 0..5 {
            std::fs::create_dir(temp.path().join(format!("App{i}.app"))).unwrap();
        }

        let request = tokio::time::timeout(Duration::from_secs(10), watcher.next_rescan())
            .await
            .expect("no rescan request")
            .expect("watcher stopped");
        assert!(request.events >= 1);
        assert!(!request.paths.is_empty());
    }
}
