//! `brew` command rendering
//!
//! Every command string handed to a shell is built here. Values are quoted
//! with `shell-words`; policy flags travel as environment assignments.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::BrewConfig;

/// A cask operation understood by `brew`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaskAction {
    Install,
    Upgrade,
    Uninstall,
}

impl CaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaskAction::Install => "install",
            CaskAction::Upgrade => "upgrade",
            CaskAction::Uninstall => "uninstall",
        }
    }

    /// Whether the artifact is downloaded before `brew` runs
    pub fn needs_artifact(&self) -> bool {
        matches!(self, CaskAction::Install | CaskAction::Upgrade)
    }
}

impl fmt::Display for CaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully specified `brew <action> --cask <token>` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrewCommand {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl BrewCommand {
    pub fn new(config: &BrewConfig, action: CaskAction, token: &str, askpass: Option<&Path>) -> Self {
        let mut args = vec![
            action.as_str().to_string(),
            "--cask".to_string(),
            token.to_string(),
        ];
        if config.force && matches!(action, CaskAction::Install | CaskAction::Upgrade) {
            args.push("--force".to_string());
        }

        let mut env = Vec::new();
        if config.disable_analytics {
            env.push(("HOMEBREW_NO_ANALYTICS".to_string(), "1".to_string()));
        }
        if config.disable_auto_update {
            env.push(("HOMEBREW_NO_AUTO_UPDATE".to_string(), "1".to_string()));
        }

        let mut cask_opts = Vec::new();
        if !config.quarantine {
            cask_opts.push("--no-quarantine");
        }
        if config.require_sha {
            cask_opts.push("--require-sha");
        }
        if !cask_opts.is_empty() {
            env.push(("HOMEBREW_CASK_OPTS".to_string(), cask_opts.join(" ")));
        }

        env.push((
            "HOMEBREW_CACHE".to_string(),
            config.cache.display().to_string(),
        ));

        if let Some(askpass) = askpass {
            env.push(("SUDO_ASKPASS".to_string(), askpass.display().to_string()));
        }

        Self {
            program: config.brew_path(),
            args,
            env,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Look up an environment assignment
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Shell command line with environment assignments prepended
    pub fn render(&self) -> String {
        let assignments = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, shell_words::quote(v)));

        let program = self.program.display().to_string();
        let command = std::iter::once(program.as_str())
            .chain(self.args.iter().map(String::as_str));

        assignments
            .chain(std::iter::once(shell_words::join(command)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for BrewCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> BrewConfig {
        BrewConfig {
            root: PathBuf::from("/opt/homebrew"),
            cache: PathBuf::from("/Users/me/Library/Caches/Homebrew"),
            ..BrewConfig::default()
        }
    }

    #[test]
    fn test_default_policy_render() {
        let cmd = BrewCommand::new(&config(), CaskAction::Install, "firefox", None);
        assert_eq!(
            cmd.render(),
            "HOMEBREW_NO_ANALYTICS=1 HOMEBREW_NO_AUTO_UPDATE=1 \
             HOMEBREW_CACHE=/Users/me/Library/Caches/Homebrew \
             /opt/homebrew/bin/brew install --cask firefox"
        );
        assert_eq!(cmd.env_var("HOMEBREW_CASK_OPTS"), None);
    }

    #[test]
    fn test_policy_flags() {
        let config = BrewConfig {
            force: true,
            quarantine: false,
            require_sha: true,
            disable_analytics: false,
            ..config()
        };

        let cmd = BrewCommand::new(
            &config,
            CaskAction::Upgrade,
            "visual-studio-code",
            Some(Path::new("/tmp/ask pass.sh")),
        );
        assert_eq!(cmd.args(), ["upgrade", "--cask", "visual-studio-code", "--force"]);
        assert_eq!(
            cmd.env_var("HOMEBREW_CASK_OPTS"),
            Some("--no-quarantine --require-sha")
        );
        assert_eq!(cmd.env_var("HOMEBREW_NO_ANALYTICS"), None);

        let rendered = cmd.render();
        assert!(rendered.contains("HOMEBREW_CASK_OPTS='--no-quarantine --require-sha'"));
        assert!(rendered.contains("SUDO_ASKPASS='/tmp/ask pass.sh'"));
    }

    #[test]
    fn test_force_not_applied_to_uninstall() {
        let config = BrewConfig {
            force: true,
            ..config()
        };
        let cmd = BrewCommand::new(&config, CaskAction::Uninstall, "firefox", None);
        assert_eq!(cmd.args(), ["uninstall", "--cask", "firefox"]);
    }

    #[test]
    fn test_token_is_quoted() {
        let cmd = BrewCommand::new(&config(), CaskAction::Install, "x; rm -rf ~", None);
        assert!(cmd.render().ends_with("install --cask 'x; rm -rf ~'"));
    }
}
