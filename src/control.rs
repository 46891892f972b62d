use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::process::run_bounded;

/// Result of one invocation of the session manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    pub success: bool,
    /// Captured stdout
    pub output: String,
    /// stderr, or a description of why the process could not run
    pub diagnostic: String,
}

impl ControlOutcome {
    #[cfg(test)]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            diagnostic: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            diagnostic: diagnostic.into(),
        }
    }
}

/// The side-effecting half of the system: everything that changes agents
#[async_trait]
pub trait ExternalControl: Send + Sync {
    async fn start(&self, name: &str, workdir: Option<&str>) -> ControlOutcome;
    async fn stop(&self, port: u16) -> ControlOutcome;
    /// The script types `text` and presses Enter
    async fn send_text(&self, port: u16, text: &str) -> ControlOutcome;
    async fn send_key(&self, port: u16, key: &str) -> ControlOutcome;
}

/// Drives `agent-terminal.sh`
pub struct ScriptControl {
    script: PathBuf,
    home: PathBuf,
    timeout: Duration,
}

impl ScriptControl {
    pub fn new(script: impl Into<PathBuf>, home: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            script: script.into(),
            home: home.into(),
            timeout,
        }
    }

    /// Arguments are handed over as argv entries, so the script sees each
    /// one verbatim (quotes included) without a shell in between.
    async fn invoke(&self, args: &[&str]) -> ControlOutcome {
        let mut cmd = Command::new(&self.script);
        cmd.args(args).env("HOME", &self.home);

        debug!(script = %self.script.display(), ?args, "invoking session manager");

        let output = match run_bounded(cmd, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, subcommand = ?args.first(), "session manager did not run");
                return ControlOutcome::failed(e.to_string());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return ControlOutcome {
                success: true,
                output: stdout,
                diagnostic: stderr,
            };
        }

        let diagnostic = if stderr.trim().is_empty() {
            format!(
                "{} {} exited with {}",
                self.script.display(),
                args.first().copied().unwrap_or_default(),
                output.status
            )
        } else {
            stderr
        };
        warn!(subcommand = ?args.first(), %diagnostic, "session manager failed");

        ControlOutcome {
            success: false,
            output: stdout,
            diagnostic,
        }
    }
}

#[async_trait]
impl ExternalControl for ScriptControl {
    async fn start(&self, name: &str, workdir: Option<&str>) -> ControlOutcome {
        // The empty second argument is the script's "initial prompt" slot
        let mut args = vec!["start", name, ""];
        if let Some(dir) = workdir {
            args.push(dir);
        }
        self.invoke(&args).await
    }

    async fn stop(&self, port: u16) -> ControlOutcome {
        self.invoke(&["stop", &port.to_string()]).await
    }

    async fn send_text(&self, port: u16, text: &str) -> ControlOutcome {
        self.invoke(&["send", &port.to_string(), text]).await
    }

    async fn send_key(&self, port: u16, key: &str) -> ControlOutcome {
        self.invoke(&["key", &port.to_string(), key]).await
    }
}
