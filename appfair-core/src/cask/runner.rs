//! Script execution
//!
//! The bridge hands a rendered command line to a [`ScriptRunner`]:
//! - `osascript` `do shell script` on macOS, so the command runs with the
//!   user's login environment the way a GUI app would launch it
//! - `sh -c` everywhere else

use async_trait::async_trait;

use crate::error::{FairError, Result};

/// Captured result of a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Runs a shell command line
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, script: &str) -> Result<ScriptOutput>;

    /// Runner identifier for logging
    fn name(&self) -> &'static str;
}

/// `sh -c <script>`
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

#[async_trait]
impl ScriptRunner for ShellRunner {
    async fn run(&self, script: &str) -> Result<ScriptOutput> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(script)
            .output()
            .await
            .map_err(|e| FairError::io("Failed to spawn shell", "sh", e))?;
        Ok(to_script_output(output))
    }

    fn name(&self) -> &'static str {
        "sh"
    }
}

/// `osascript -e 'do shell script "<script>"'`
#[derive(Debug, Default, Clone)]
pub struct OsaScriptRunner;

#[async_trait]
impl ScriptRunner for OsaScriptRunner {
    async fn run(&self, script: &str) -> Result<ScriptOutput> {
        let output = tokio::process::Command::new("/usr/bin/osascript")
            .arg("-e")
            .arg(do_shell_script(script))
            .output()
            .await
            .map_err(|e| FairError::io("Failed to spawn osascript", "/usr/bin/osascript", e))?;
        Ok(to_script_output(output))
    }

    fn name(&self) -> &'static str {
        "osascript"
    }
}

/// AppleScript source that runs `script` in a shell
pub fn do_shell_script(script: &str) -> String {
    let escaped = script.replace('\\', "\\\\").replace('"', "\\\"");
    format!("do shell script \"{escaped}\"")
}

fn to_script_output(output: std::process::Output) -> ScriptOutput {
    ScriptOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

/// Runner for the current platform
pub fn default_runner() -> Box<dyn ScriptRunner> {
    if cfg!(target_os = "macos") {
        Box::new(OsaScriptRunner)
    } else {
        Box::new(ShellRunner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_do_shell_script_escapes_quotes() {
        assert_eq!(
            do_shell_script(r#"echo "a\b""#),
            r#"do shell script "echo \"a\\b\"""#
        );
    }

    #[test]
    fn test_combined_output() {
        let output = ScriptOutput {
            code: Some(1),
            stdout: "==> Downloading\n".to_string(),
            stderr: "Error: nope\n".to_string(),
        };
        assert!(!output.success());
        assert_eq!(output.combined(), "==> Downloading\nError: nope");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runner_captures_exit_code() {
        let output = ShellRunner
            .run("echo out; echo err >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }
}
