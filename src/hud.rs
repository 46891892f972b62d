use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::control::{ExternalControl, ScriptControl};
use crate::dispatch::Dispatcher;
use crate::logtail::{LogTail, LogTailError, LogWindow};
use crate::mesh::{MeshResolver, StaticAddress, TailscaleResolver};
use crate::registry::RegistryReader;
use crate::tmux::{SessionLivenessChecker, TmuxClient};
use crate::view::AgentListing;

/// Everything a request needs: read-only config plus stateless adapters
pub struct Hud {
    config: Config,
    registry: RegistryReader,
    logs: LogTail,
    liveness: Arc<dyn SessionLivenessChecker>,
    control: Arc<dyn ExternalControl>,
    mesh: Arc<dyn MeshResolver>,
}

impl Hud {
    pub fn new(
        config: Config,
        liveness: Arc<dyn SessionLivenessChecker>,
        control: Arc<dyn ExternalControl>,
        mesh: Arc<dyn MeshResolver>,
    ) -> Self {
        Self {
            registry: RegistryReader::new(&config.state_dir),
            logs: LogTail::new(&config.logs_dir),
            config,
            liveness,
            control,
            mesh,
        }
    }

    /// Wire up tmux, the control script and the mesh resolver from config
    pub fn from_config(config: Config) -> Self {
        let liveness = Arc::new(TmuxClient::new(&config.tmux_path, config.probe_timeout));
        let control = Arc::new(ScriptControl::new(
            &config.script,
            &config.home,
            config.control_timeout,
        ));
        let mesh: Arc<dyn MeshResolver> = match &config.mesh_address {
            Some(address) => Arc::new(StaticAddress(address.clone())),
            None => Arc::new(TailscaleResolver::new(config.probe_timeout)),
        };
        Self::new(config, liveness, control, mesh)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(self.control.as_ref())
    }

    pub async fn mesh_address(&self) -> String {
        self.mesh.resolve().await
    }

    pub fn agent_url(&self, mesh_address: &str, port: u16) -> String {
        self.config.agent_url(mesh_address, port)
    }

    /// Live agents with display URLs. Never fails; see [`AgentListing::compose`].
    pub async fn list_agents_for_display(&self) -> AgentListing {
        let live = self.registry.list_live_agents(self.liveness.as_ref()).await;
        if let Err(e) = &live {
            warn!(error = %e, "agent listing failed");
        }
        let mesh_address = self.mesh.resolve().await;
        AgentListing::compose(live, mesh_address, |address, port| {
            self.config.agent_url(address, port)
        })
    }

    pub async fn read_log_window(&self, port: u16, lines: i64, offset: i64) -> Result<LogWindow, LogTailError> {
        self.logs.read_window(port, lines, offset).await
    }
}
