use serde::Serialize;

use crate::registry::{AgentDescriptor, RegistryError};

/// Only live agents are listed, so this is the only status ever shown
pub const RUNNING: &str = "running";

/// An agent as presented to dashboard clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayAgent {
    pub id: String,
    pub name: String,
    pub port: u16,
    pub workdir: String,
    pub original_workdir: String,
    pub is_worktree: bool,
    pub session_name: String,
    pub status: &'static str,
    pub started: String,
    pub url: String,
}

impl DisplayAgent {
    pub fn new(descriptor: AgentDescriptor, url: String) -> Self {
        Self {
            id: descriptor.port.to_string(),
            original_workdir: descriptor.original_workdir().to_string(),
            name: descriptor.name,
            port: descriptor.port,
            workdir: descriptor.workdir,
            is_worktree: descriptor.is_worktree,
            session_name: descriptor.session_name,
            status: RUNNING,
            started: descriptor.started,
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentListing {
    pub agents: Vec<DisplayAgent>,
    pub mesh_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentListing {
    /// Merge a registry read with the resolved address. A failed read
    /// degrades to an empty list carrying the error text.
    pub fn compose(
        live: Result<Vec<AgentDescriptor>, RegistryError>,
        mesh_address: String,
        url_for: impl Fn(&str, u16) -> String,
    ) -> Self {
        match live {
            Ok(descriptors) => Self {
                agents: descriptors
                    .into_iter()
                    .map(|d| {
                        let url = url_for(&mesh_address, d.port);
                        DisplayAgent::new(d, url)
                    })
                    .collect(),
                mesh_address,
                error: None,
            },
            Err(e) => Self {
                agents: Vec::new(),
                mesh_address,
                error: Some(e.to_string()),
            },
        }
    }
}
