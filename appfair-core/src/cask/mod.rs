//! Homebrew cask bridge
//!
//! Casks are installed by `brew` itself. Before handing over, the bridge
//! fetches the cask's metadata, downloads the artifact into Homebrew's
//! download cache and checks its checksum, so `brew` reuses a verified file.
//! Phases are tracked in a [`CaskOperation`].

mod askpass;
mod command;
mod operation;
mod runner;

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub use askpass::{write_askpass, ASKPASS_FILE_NAME};
pub use command::{BrewCommand, CaskAction};
pub use operation::{CaskOperation, CaskPhase};
pub use runner::{
    default_runner, do_shell_script, OsaScriptRunner, ScriptOutput, ScriptRunner, ShellRunner,
};

use crate::catalog::{http_client, CaskItem, CatalogFetcher};
use crate::config::{cask_info_url, BrewConfig, FairConfig};
use crate::error::{FairError, Result};
use crate::install::{download, verify_fairseal, CancellationToken, Progress};

/// Runs cask operations through `brew`
pub struct CaskBridge {
    config: BrewConfig,
    info_url_template: String,
    fetcher: CatalogFetcher,
    client: reqwest::Client,
    helper_dir: PathBuf,
    runner: Box<dyn ScriptRunner>,
}

impl CaskBridge {
    pub fn new(
        config: BrewConfig,
        info_url_template: impl Into<String>,
        fetcher: CatalogFetcher,
        helper_dir: impl Into<PathBuf>,
        runner: Box<dyn ScriptRunner>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            info_url_template: info_url_template.into(),
            fetcher,
            client: http_client(None)?,
            helper_dir: helper_dir.into(),
            runner,
        })
    }

    pub fn from_config(config: &FairConfig) -> Result<Self> {
        Self::new(
            config.brew.clone(),
            config.cask_info_url.clone(),
            CatalogFetcher::from_config(config)?,
            config.cache_dir.clone(),
            default_runner(),
        )
    }

    pub fn brew_config(&self) -> &BrewConfig {
        &self.config
    }

    /// Fail with [`FairError::PackageManagerMissing`] if `brew` is absent
    pub fn ensure_brew(&self) -> Result<PathBuf> {
        let brew = self.config.brew_path();
        if brew.is_file() {
            Ok(brew)
        } else {
            Err(FairError::PackageManagerMissing { path: brew })
        }
    }

    /// The command that `run` would execute, without side effects
    pub fn command(&self, action: CaskAction, token: &str) -> BrewCommand {
        let askpass = self
            .config
            .use_askpass
            .then(|| self.helper_dir.join(ASKPASS_FILE_NAME));
        BrewCommand::new(&self.config, action, token, askpass.as_deref())
    }

    /// Where Homebrew looks for a previously fetched artifact
    pub fn cached_download_path(&self, url: &str) -> PathBuf {
        self.config
            .cache
            .join("downloads")
            .join(cached_download_name(url))
    }

    /// Drive `op` from idle to `Rescanning`
    ///
    /// The caller rescans and then advances the operation to `Succeeded`.
    /// On error the operation is marked failed with the error text.
    pub async fn run(
        &self,
        op: &mut CaskOperation,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<ScriptOutput> {
        match self.run_phases(op, progress, cancel).await {
            Ok(output) => Ok(output),
            Err(e) => {
                op.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        op: &mut CaskOperation,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<ScriptOutput> {
        self.ensure_brew()?;

        if op.action.needs_artifact() {
            op.advance(CaskPhase::FetchingCaskInfo);
            let url = cask_info_url(&self.info_url_template, &op.token);
            let cask = self.fetcher.fetch_cask_info(&url).await?;
            cancel.check()?;

            op.advance(CaskPhase::Downloading);
            self.prefetch(op, &cask, progress, cancel).await?;
        }

        cancel.check()?;
        op.advance(CaskPhase::InvokingPackageManager);

        if self.config.use_askpass {
            write_askpass(&self.helper_dir)?;
        }
        let command = self.command(op.action, &op.token);
        let script = command.render();
        tracing::info!("Running {} via {}", script, self.runner.name());

        let output = self.runner.run(&script).await?;
        if !output.success() {
            return Err(FairError::ExternalProcess {
                command: script,
                code: output.code,
                output: output.combined(),
            });
        }

        op.advance(CaskPhase::Rescanning);
        Ok(output)
    }

    /// Download the artifact into Homebrew's cache and check its checksum
    async fn prefetch(
        &self,
        op: &mut CaskOperation,
        cask: &CaskItem,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let dest = self.cached_download_path(&cask.url);
        let downloads = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.cache.clone());

        let artifact = download(&self.client, &cask.url, &downloads, progress, cancel).await?;

        op.advance(CaskPhase::VerifyingChecksum);
        match cask.checksum() {
            Some(expected) => verify_fairseal(&cask.token, Some(expected), &artifact.sha256)?,
            None if self.config.require_sha => {
                return Err(FairError::MissingFairseal {
                    name: cask.token.clone(),
                })
            }
            None => tracing::warn!("Cask {} has no checksum; skipping verification", cask.token),
        }

        artifact.persist(&dest)
    }
}

/// Homebrew's cache file name: `<sha256(url)>--<basename>`
pub fn cached_download_name(url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let basename = without_query
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("download");
    format!("{digest}--{basename}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records scripts instead of running them
    #[derive(Clone, Default)]
    struct RecordingRunner {
        scripts: Arc<Mutex<Vec<String>>>,
        exit_code: i32,
    }

    #[async_trait]
    impl ScriptRunner for RecordingRunner {
        async fn run(&self, script: &str) -> Result<ScriptOutput> {
            self.scripts.lock().unwrap().push(script.to_string());
            Ok(ScriptOutput {
                code: Some(self.exit_code),
                stdout: "==> done".to_string(),
                stderr: String::new(),
            })
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct Fixture {
        temp: TempDir,
        runner: RecordingRunner,
        bridge: CaskBridge,
    }

    fn fixture(payload: &[u8], sha256: &str, exit_code: i32, require_sha: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("brew");
        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::write(root.join("bin/brew"), "#!/bin/sh\n").unwrap();

        let artifact = temp.path().join("Firefox.dmg");
        std::fs::write(&artifact, payload).unwrap();

        let info_dir = temp.path().join("api");
        std::fs::create_dir_all(&info_dir).unwrap();
        let info = serde_json::json!({
            "token": "firefox",
            "name": ["Firefox"],
            "url": format!("file://{}", artifact.display()),
            "version": "120.0",
            "sha256": sha256,
        });
        std::fs::write(info_dir.join("firefox.json"), info.to_string()).unwrap();

        let config = BrewConfig {
            root,
            cache: temp.path().join("brew-cache"),
            require_sha,
            ..BrewConfig::default()
        };
        let runner = RecordingRunner {
            exit_code,
            ..RecordingRunner::default()
        };
        let bridge = CaskBridge::new(
            config,
            format!("file://{}/{{token}}.json", info_dir.display()),
            CatalogFetcher::new(temp.path().join("cache"), Duration::from_secs(60)).unwrap(),
            temp.path().join("helpers"),
            Box::new(runner.clone()),
        )
        .unwrap();

        Fixture {
            temp,
            runner,
            bridge,
        }
    }

    #[test]
    fn test_cached_download_name() {
        let name = cached_download_name("https://example.com/dl/Firefox%20120.dmg?x=1");
        assert!(name.ends_with("--Firefox%20120.dmg"));
        assert_eq!(name.split("--").next().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_install_runs_all_phases() {
        let payload = b"firefox disk image";
        let sha = format!("{:x}", Sha256::digest(payload));
        let f = fixture(payload, &sha, 0, false);

        let mut op = CaskOperation::new(CaskAction::Install, "firefox");
        f.bridge
            .run(&mut op, &Progress::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(op.phase(), &CaskPhase::Rescanning);
        assert_eq!(op.history().count(), 6);

        let scripts = f.runner.scripts.lock().unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].ends_with("install --cask firefox"));
        assert!(scripts[0].contains("SUDO_ASKPASS="));
        assert!(f.temp.path().join("helpers").join(ASKPASS_FILE_NAME).exists());

        let cached = std::fs::read_dir(f.temp.path().join("brew-cache/downloads"))
            .unwrap()
            .count();
        assert_eq!(cached, 1);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_never_invokes_brew() {
        let f = fixture(b"tampered", "abc123", 0, false);

        let mut op = CaskOperation::new(CaskAction::Install, "firefox");
        let err = f
            .bridge
            .run(&mut op, &Progress::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FairError::InvalidFairseal { .. }));
        assert!(matches!(op.phase(), CaskPhase::Failed(_)));
        assert!(f.runner.scripts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_check_requires_opt_out() {
        let f = fixture(b"payload", "no_check", 0, true);
        let mut op = CaskOperation::new(CaskAction::Upgrade, "firefox");
        let err = f
            .bridge
            .run(&mut op, &Progress::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FairError::MissingFairseal { .. }));

        let f = fixture(b"payload", "no_check", 0, false);
        let mut op = CaskOperation::new(CaskAction::Upgrade, "firefox");
        f.bridge
            .run(&mut op, &Progress::new(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_brew_failure_surfaces_output() {
        let f = fixture(b"", "no_check", 1, false);
        let mut op = CaskOperation::new(CaskAction::Uninstall, "firefox");
        let err = f
            .bridge
            .run(&mut op, &Progress::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            FairError::ExternalProcess { code, output, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(output, "==> done");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Uninstall never downloads
        let phases: Vec<_> = op.history().cloned().collect();
        assert!(!phases.contains(&CaskPhase::Downloading));
    }

    #[tokio::test]
    async fn test_missing_brew() {
        let f = fixture(b"", "no_check", 0, false);
        std::fs::remove_file(f.temp.path().join("brew/bin/brew")).unwrap();

        let mut op = CaskOperation::new(CaskAction::Install, "firefox");
        let err = f
            .bridge
            .run(&mut op, &Progress::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FairError::PackageManagerMissing { .. }));
        assert!(err.to_string().starts_with("No such file"));
    }
}
