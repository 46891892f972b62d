use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::SessionLivenessChecker;
use crate::process::run_bounded;

/// Client for probing tmux via CLI
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
    /// Upper bound for a single probe
    probe_timeout: Duration,
}

impl TmuxClient {
    pub fn new(tmux_path: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            tmux_path: tmux_path.into(),
            probe_timeout,
        }
    }

    /// Check whether a session with exactly this name exists
    pub async fn has_session(&self, session_name: &str) -> bool {
        if session_name.is_empty() {
            return false;
        }

        // `=` disables tmux's prefix matching on the target
        let mut cmd = Command::new(&self.tmux_path);
        cmd.args(["has-session", "-t", &format!("={}", session_name)]);

        match run_bounded(cmd, self.probe_timeout).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!(session = %session_name, error = %e, "tmux probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl SessionLivenessChecker for TmuxClient {
    async fn is_alive(&self, session_name: &str) -> bool {
        self.has_session(session_name).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tmux_binary_means_not_alive() {
        let client = TmuxClient::new("/nonexistent/tmux", Duration::from_millis(500));
        assert!(!client.is_alive("agent-7681").await);
    }

    #[tokio::test]
    async fn test_empty_session_name_is_never_alive() {
        // `true` would report success for any arguments
        let client = TmuxClient::new("true", Duration::from_millis(500));
        assert!(!client.is_alive("").await);
        assert!(client.is_alive("agent-7681").await);
    }
}
