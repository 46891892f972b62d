//! Reads the session manager's per-agent descriptor files and keeps only the
//! agents whose tmux session is still running.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::tmux::SessionLivenessChecker;

/// One agent as recorded by the session manager in `<port>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub port: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub workdir: String,
    #[serde(default)]
    pub original_workdir: Option<String>,
    #[serde(default)]
    pub is_worktree: bool,
    pub session_name: String,
    #[serde(default)]
    pub started: String,
}

impl AgentDescriptor {
    /// Directory the agent was launched for, before any worktree checkout
    pub fn original_workdir(&self) -> &str {
        self.original_workdir
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .unwrap_or(&self.workdir)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read agent registry {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lists live agents from a descriptor directory
pub struct RegistryReader {
    state_dir: PathBuf,
}

impl RegistryReader {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Every parseable descriptor, alive or not
    pub async fn read_descriptors(&self) -> Result<Vec<AgentDescriptor>, RegistryError> {
        let io_err = |source| RegistryError::Io {
            path: self.state_dir.clone(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut descriptors = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(descriptor) = read_descriptor(&path).await {
                descriptors.push(descriptor);
            }
        }

        Ok(descriptors)
    }

    /// Descriptors whose tmux session currently exists, in directory order
    pub async fn list_live_agents(
        &self,
        liveness: &dyn SessionLivenessChecker,
    ) -> Result<Vec<AgentDescriptor>, RegistryError> {
        let mut live = Vec::new();
        for descriptor in self.read_descriptors().await? {
            if liveness.is_alive(&descriptor.session_name).await {
                live.push(descriptor);
            } else {
                debug!(
                    port = descriptor.port,
                    session = %descriptor.session_name,
                    "skipping agent with dead session"
                );
            }
        }
        Ok(live)
    }
}

async fn read_descriptor(path: &Path) -> Option<AgentDescriptor> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable descriptor");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "malformed descriptor");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Liveness checker that knows a fixed set of sessions
    pub(crate) struct FixedSessions(pub HashSet<String>);

    impl FixedSessions {
        pub(crate) fn new(names: &[&str]) -> Self {
            Self(names.iter().map(|n| n.to_string()).collect())
        }
    }

    #[async_trait]
    impl SessionLivenessChecker for FixedSessions {
        async fn is_alive(&self, session_name: &str) -> bool {
            self.0.contains(session_name)
        }
    }

    pub(crate) fn write_descriptor(dir: &Path, port: u16, session: &str) {
        let body = serde_json::json!({
            "port": port,
            "name": format!("task {}", port),
            "workdir": "/work/repo-wt",
            "original_workdir": "/work/repo",
            "session_name": session,
            "started": "2026-10-19T08:00:00Z",
            "is_worktree": true
        });
        std::fs::write(dir.join(format!("{}.json", port)), body.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let reader = RegistryReader::new(temp.path().join("absent"));

        let agents = reader
            .list_live_agents(&FixedSessions::new(&["agent-7681"]))
            .await
            .unwrap();
        assert!(agents.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_and_foreign_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        write_descriptor(temp.path(), 7681, "agent-7681");
        std::fs::write(temp.path().join("7682.json"), "{ not json").unwrap();
        std::fs::write(temp.path().join("7683.json"), r#"{"name": "no port"}"#).unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let reader = RegistryReader::new(temp.path());
        let agents = reader
            .list_live_agents(&FixedSessions::new(&["agent-7681", "agent-7682"]))
            .await
            .unwrap();

        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].port, 7681);
        assert!(agents[0].is_worktree);
        assert_eq!(agents[0].original_workdir(), "/work/repo");
    }

    #[tokio::test]
    async fn test_all_malformed_is_empty() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("1.json"), "[]").unwrap();
        std::fs::write(temp.path().join("2.json"), "").unwrap();

        let reader = RegistryReader::new(temp.path());
        let agents = reader
            .list_live_agents(&FixedSessions::new(&[]))
            .await
            .unwrap();
        assert!(agents.is_empty());
    }

    #[tokio::test]
    async fn test_dead_sessions_are_excluded_not_deleted() {
        let temp = TempDir::new().unwrap();
        write_descriptor(temp.path(), 7681, "agent-7681");
        write_descriptor(temp.path(), 7690, "agent-7690");

        let reader = RegistryReader::new(temp.path());
        let agents = reader
            .list_live_agents(&FixedSessions::new(&["agent-7690"]))
            .await
            .unwrap();

        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].session_name, "agent-7690");
        assert!(temp.path().join("7681.json").exists());
    }

    #[test]
    fn test_minimal_descriptor_defaults() {
        let descriptor: AgentDescriptor =
            serde_json::from_str(r#"{"port": 7700, "session_name": "agent-7700", "extra": 1}"#)
                .unwrap();

        assert_eq!(descriptor.name, "");
        assert!(!descriptor.is_worktree);
        assert_eq!(descriptor.original_workdir(), "");
    }

    #[tokio::test]
    async fn test_bridge_pid_shape_does_not_hide_agent() {
        let temp = TempDir::new().unwrap();
        for (port, pid) in [
            (7681, serde_json::json!("12345")),
            (7682, serde_json::json!(-1)),
            (7683, serde_json::json!(null)),
        ] {
            let body = serde_json::json!({
                "port": port,
                "session_name": format!("agent-{}", port),
                "ttyd_pid": pid
            });
            std::fs::write(temp.path().join(format!("{}.json", port)), body.to_string()).unwrap();
        }

        let reader = RegistryReader::new(temp.path());
        let mut agents = reader
            .list_live_agents(&FixedSessions::new(&["agent-7681", "agent-7682", "agent-7683"]))
            .await
            .unwrap();
        agents.sort_by_key(|a| a.port);

        let ports: Vec<u16> = agents.iter().map(|a| a.port).collect();
        assert_eq!(ports, vec![7681, 7682, 7683]);
    }
}
