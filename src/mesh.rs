use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::process::run_bounded;

/// Label used in agent URLs when no mesh address can be found
pub const FALLBACK_ADDRESS: &str = "localhost";

/// CLI shipped inside the macOS app bundle, used when `tailscale` is not on PATH
const MACOS_TAILSCALE: &str = "/Applications/Tailscale.app/Contents/MacOS/Tailscale";

#[async_trait]
pub trait MeshResolver: Send + Sync {
    /// Best-effort address; never fails, falls back to [`FALLBACK_ADDRESS`]
    async fn resolve(&self) -> String;
}

/// Asks Tailscale for this machine's IPv4 address
pub struct TailscaleResolver {
    candidates: Vec<String>,
    timeout: Duration,
}

impl TailscaleResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            candidates: vec!["tailscale".to_string(), MACOS_TAILSCALE.to_string()],
            timeout,
        }
    }

    async fn query(&self, binary: &str) -> Option<String> {
        let mut cmd = Command::new(binary);
        cmd.args(["ip", "-4"]);

        match run_bounded(cmd, self.timeout).await {
            Ok(output) if output.status.success() => {
                first_address(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!(binary, status = %output.status, "tailscale ip failed");
                None
            }
            Err(e) => {
                debug!(binary, error = %e, "tailscale unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl MeshResolver for TailscaleResolver {
    async fn resolve(&self) -> String {
        for binary in &self.candidates {
            if let Some(address) = self.query(binary).await {
                return address;
            }
        }
        FALLBACK_ADDRESS.to_string()
    }
}

/// A fixed address, for hosts where the mesh address is configured
pub struct StaticAddress(pub String);

#[async_trait]
impl MeshResolver for StaticAddress {
    async fn resolve(&self) -> String {
        self.0.clone()
    }
}

fn first_address(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
