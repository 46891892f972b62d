use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Interval between agent listing refreshes in the watch client
pub const LISTING_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Interval between log refreshes in the watch client
pub const LOG_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Number of log lines the watch client asks for
pub const WATCH_LOG_LINES: i64 = 500;

#[derive(Parser, Debug)]
#[command(name = "agent-hud", version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Mode>,
    /// Address the HTTP API listens on
    #[arg(long, env = "AGENT_HUD_ADDR", default_value = "127.0.0.1:3000", global = true)]
    pub addr: String,
    /// Directory holding one `<port>.json` descriptor per agent
    #[arg(long, env = "AGENT_HUD_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,
    /// Directory holding one `<port>.log` output file per agent
    #[arg(long, env = "AGENT_HUD_LOGS_DIR", global = true)]
    pub logs_dir: Option<PathBuf>,
    /// Session manager control script
    #[arg(long, env = "AGENT_HUD_SCRIPT", global = true)]
    pub script: Option<PathBuf>,
    /// tmux binary used for liveness probes
    #[arg(long, env = "AGENT_HUD_TMUX", default_value = "tmux", global = true)]
    pub tmux: String,
    /// Skip mesh address probing and use this address in agent URLs
    #[arg(long, env = "AGENT_HUD_MESH_ADDRESS", global = true)]
    pub mesh_address: Option<String>,
    #[arg(long, default_value = "http", global = true)]
    pub url_scheme: String,
    #[arg(long, default_value_t = 2000, global = true)]
    pub probe_timeout_ms: u64,
    #[arg(long, default_value_t = 30, global = true)]
    pub control_timeout_secs: u64,
    #[arg(long, env = "AGENT_HUD_DEBUG", default_value_t = false, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Serve the JSON API (default)
    Serve,
    /// Run the terminal dashboard
    Watch,
}

/// Resolved runtime configuration, shared read-only by every component
#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub script: PathBuf,
    pub home: PathBuf,
    pub tmux_path: String,
    pub mesh_address: Option<String>,
    pub url_scheme: String,
    pub probe_timeout: Duration,
    pub control_timeout: Duration,
    pub debug: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let claude_dir = home.join(".claude");

        Self {
            addr: args.addr.clone(),
            state_dir: args
                .state_dir
                .clone()
                .unwrap_or_else(|| claude_dir.join("agent-terminals")),
            logs_dir: args
                .logs_dir
                .clone()
                .unwrap_or_else(|| claude_dir.join("agent-logs")),
            script: args
                .script
                .clone()
                .unwrap_or_else(|| claude_dir.join("scripts").join("agent-terminal.sh")),
            home,
            tmux_path: args.tmux.clone(),
            mesh_address: args
                .mesh_address
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            url_scheme: args.url_scheme.clone(),
            probe_timeout: Duration::from_millis(args.probe_timeout_ms),
            control_timeout: Duration::from_secs(args.control_timeout_secs),
            debug: args.debug,
        }
    }

    /// Build the externally reachable terminal URL for an agent
    pub fn agent_url(&self, mesh_address: &str, port: u16) -> String {
        format!("{}://{}:{}", self.url_scheme, mesh_address, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_live_under_claude_dir() {
        let args = Args::parse_from(["agent-hud"]);
        let config = Config::from_args(&args);

        assert!(args.command.is_none());
        assert!(config.state_dir.ends_with(".claude/agent-terminals"));
        assert!(config.logs_dir.ends_with(".claude/agent-logs"));
        assert!(config.script.ends_with(".claude/scripts/agent-terminal.sh"));
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.control_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides_and_blank_mesh_address() {
        let args = Args::parse_from([
            "agent-hud",
            "watch",
            "--state-dir",
            "/tmp/state",
            "--mesh-address",
            "  ",
            "--url-scheme",
            "https",
        ]);
        let config = Config::from_args(&args);

        assert_eq!(args.command, Some(Mode::Watch));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/state"));
        assert_eq!(config.mesh_address, None);
        assert_eq!(config.agent_url("100.64.0.1", 7681), "https://100.64.0.1:7681");
    }
}
