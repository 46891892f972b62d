//! Validates agent actions and hands them to the session manager.
//!
//! Nothing here retries: a failed invocation is reported once, with the
//! script's own diagnostics, and the caller decides what to do next.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

use crate::control::{ControlOutcome, ExternalControl};

static RE_PORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"Port (\d+)").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Task name is required")]
    MissingName,
    #[error("Port is required")]
    MissingPort,
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    #[error("Text is required")]
    MissingText,
    #[error("Key is required")]
    MissingKey,
    #[error("Invalid key: {given}. Valid keys: {}", AgentKey::valid_names().join(", "))]
    InvalidKey { given: String },
    /// The session manager ran and failed, or could not be run
    #[error("{0}")]
    External(String),
}

impl DispatchError {
    /// Whether the request itself was at fault
    pub fn is_validation(&self) -> bool {
        !matches!(self, DispatchError::External(_))
    }
}

/// The keys that may be sent to an agent without a trailing Enter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKey {
    Esc,
    Escape,
    CtrlB,
    CB,
    CtrlC,
    CC,
    Enter,
    Up,
    Down,
    Left,
    Right,
}

impl AgentKey {
    pub const ALL: [AgentKey; 11] = [
        AgentKey::Esc,
        AgentKey::Escape,
        AgentKey::CtrlB,
        AgentKey::CB,
        AgentKey::CtrlC,
        AgentKey::CC,
        AgentKey::Enter,
        AgentKey::Up,
        AgentKey::Down,
        AgentKey::Left,
        AgentKey::Right,
    ];

    /// Name understood by the session manager's `key` subcommand
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKey::Esc => "esc",
            AgentKey::Escape => "escape",
            AgentKey::CtrlB => "ctrl-b",
            AgentKey::CB => "c-b",
            AgentKey::CtrlC => "ctrl-c",
            AgentKey::CC => "c-c",
            AgentKey::Enter => "enter",
            AgentKey::Up => "up",
            AgentKey::Down => "down",
            AgentKey::Left => "left",
            AgentKey::Right => "right",
        }
    }

    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }
}

impl FromStr for AgentKey {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DispatchError::MissingKey);
        }
        let normalized = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| DispatchError::InvalidKey {
                given: s.to_string(),
            })
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a port given as text, as found in query strings and loose JSON
pub fn parse_port(raw: Option<&str>) -> Result<u16, DispatchError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(DispatchError::MissingPort)?;
    match raw.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(DispatchError::InvalidPort(raw.to_string())),
    }
}

/// First `Port <N>` token in the session manager's start output
pub fn extract_port(output: &str) -> Option<u16> {
    RE_PORT
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedAgent {
    /// `None` means the agent started but its port could not be read back
    pub port: Option<u16>,
    pub output: String,
}

pub struct Dispatcher<'a> {
    control: &'a dyn ExternalControl,
}

impl<'a> Dispatcher<'a> {
    pub fn new(control: &'a dyn ExternalControl) -> Self {
        Self { control }
    }

    pub async fn start_agent(&self, name: &str, workdir: Option<&str>) -> Result<StartedAgent, DispatchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DispatchError::MissingName);
        }
        let workdir = workdir.filter(|dir| !dir.is_empty());

        let output = into_result(self.control.start(name, workdir).await)?;
        let port = extract_port(&output);
        info!(name, ?port, "agent started");

        Ok(StartedAgent { port, output })
    }

    pub async fn stop_agent(&self, port: u16) -> Result<(), DispatchError> {
        into_result(self.control.stop(port).await)?;
        info!(port, "agent stopped");
        Ok(())
    }

    /// Empty text is allowed and amounts to a bare Enter
    pub async fn send_text(&self, port: u16, text: &str) -> Result<String, DispatchError> {
        into_result(self.control.send_text(port, text).await)
    }

    pub async fn send_key(&self, port: u16, key: &str) -> Result<(AgentKey, String), DispatchError> {
        let key: AgentKey = key.parse()?;
        let output = into_result(self.control.send_key(port, key.as_str()).await)?;
        Ok((key, output))
    }
}

fn into_result(outcome: ControlOutcome) -> Result<String, DispatchError> {
    if outcome.success {
        Ok(outcome.output)
    } else {
        Err(DispatchError::External(outcome.diagnostic))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every call and answers with a canned outcome
    pub(crate) struct RecordingControl {
        pub calls: Mutex<Vec<Vec<String>>>,
        pub outcome: ControlOutcome,
    }

    impl RecordingControl {
        pub(crate) fn new(outcome: ControlOutcome) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome,
            }
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &[&str]) -> ControlOutcome {
            self.calls
                .lock()
                .unwrap()
                .push(call.iter().map(|s| s.to_string()).collect());
            self.outcome.clone()
        }
    }

    #[async_trait]
    impl ExternalControl for RecordingControl {
        async fn start(&self, name: &str, workdir: Option<&str>) -> ControlOutcome {
            self.record(&["start", name, workdir.unwrap_or("-")])
        }

        async fn stop(&self, port: u16) -> ControlOutcome {
            self.record(&["stop", &port.to_string()])
        }

        async fn send_text(&self, port: u16, text: &str) -> ControlOutcome {
            self.record(&["send", &port.to_string(), text])
        }

        async fn send_key(&self, port: u16, key: &str) -> ControlOutcome {
            self.record(&["key", &port.to_string(), key])
        }
    }

    #[tokio::test]
    async fn test_blank_name_never_reaches_script() {
        let control = RecordingControl::new(ControlOutcome::ok("Port 7681"));
        let dispatcher = Dispatcher::new(&control);

        assert_eq!(dispatcher.start_agent("", None).await, Err(DispatchError::MissingName));
        assert_eq!(
            dispatcher.start_agent(" \t\n", Some("/work")).await,
            Err(DispatchError::MissingName)
        );
        assert!(control.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_extracts_port() {
        let control = RecordingControl::new(ControlOutcome::ok(
            "Creating worktree...\nAgent 'fix' running on Port 7684\nttyd on Port 9999\n",
        ));
        let dispatcher = Dispatcher::new(&control);

        let started = dispatcher.start_agent("  fix  ", Some("")).await.unwrap();
        assert_eq!(started.port, Some(7684));
        assert_eq!(control.calls(), vec![vec!["start", "fix", "-"]]);
    }

    #[tokio::test]
    async fn test_start_without_port_token_still_succeeds() {
        let control = RecordingControl::new(ControlOutcome::ok("started\n"));
        let dispatcher = Dispatcher::new(&control);

        let started = dispatcher.start_agent("fix", None).await.unwrap();
        assert_eq!(started.port, None);
        assert_eq!(started.output, "started\n");
    }

    #[tokio::test]
    async fn test_external_failure_is_reported_not_retried() {
        let control = RecordingControl::new(ControlOutcome::failed("tmux: no server running\n"));
        let dispatcher = Dispatcher::new(&control);

        let err = dispatcher.stop_agent(7681).await.unwrap_err();
        assert_eq!(err, DispatchError::External("tmux: no server running\n".to_string()));
        assert!(!err.is_validation());
        assert_eq!(control.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_send_text_passes_quotes_through() {
        let control = RecordingControl::new(ControlOutcome::ok(""));
        let dispatcher = Dispatcher::new(&control);

        dispatcher.send_text(7681, r#"He said "hi""#).await.unwrap();
        dispatcher.send_text(7681, "").await.unwrap();
        assert_eq!(
            control.calls(),
            vec![
                vec!["send", "7681", r#"He said "hi""#],
                vec!["send", "7681", ""]
            ]
        );
    }

    #[tokio::test]
    async fn test_send_key_normalizes_case() {
        let control = RecordingControl::new(ControlOutcome::ok(""));
        let dispatcher = Dispatcher::new(&control);

        let (key, _) = dispatcher.send_key(7681, "ESC").await.unwrap();
        assert_eq!(key, AgentKey::Esc);
        assert_eq!(control.calls(), vec![vec!["key", "7681", "esc"]]);
    }

    #[tokio::test]
    async fn test_send_key_rejects_unknown_key() {
        let control = RecordingControl::new(ControlOutcome::ok(""));
        let dispatcher = Dispatcher::new(&control);

        let err = dispatcher.send_key(7681, "ctrl-z").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Invalid key: ctrl-z. Valid keys: esc, escape, ctrl-b, c-b, ctrl-c, c-c, enter, up, down, left, right"
        );
        assert_eq!(dispatcher.send_key(7681, "").await.unwrap_err(), DispatchError::MissingKey);
        assert!(control.calls().is_empty());
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(Some("7681")), Ok(7681));
        assert_eq!(parse_port(Some(" 7681 ")), Ok(7681));
        assert_eq!(parse_port(None), Err(DispatchError::MissingPort));
        assert_eq!(parse_port(Some("")), Err(DispatchError::MissingPort));
        assert_eq!(parse_port(Some("abc")), Err(DispatchError::InvalidPort("abc".into())));
        assert_eq!(parse_port(Some("70000")), Err(DispatchError::InvalidPort("70000".into())));
        assert_eq!(parse_port(Some("0")), Err(DispatchError::InvalidPort("0".into())));
    }
}
