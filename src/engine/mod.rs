//! Container engine boundary.
//!
//! The sandbox layer never talks to a container runtime directly; it goes
//! through [`ContainerEngine`], shared across the worker as
//! `Arc<dyn ContainerEngine>`. [`DockerCli`] is the production implementation.

mod docker;
#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cmd::CmdError;

pub use docker::DockerCli;

/// Errors reported by the container engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Command(#[from] CmdError),

    #[error("no such object: {0}")]
    NotFound(String),

    #[error("engine rejected request: {0}")]
    Daemon(String),

    #[error("failed to parse {what} output: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Runtime state of a container as last reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Engine status word: created, running, paused, restarting, exited, dead...
    pub status: String,
    pub running: bool,
    pub paused: bool,
    /// Host PID of the container's root process; 0 when not running.
    pub pid: u32,
}

impl ContainerState {
    /// Human readable state, as printed in diagnostics and dumps.
    pub fn state_string(&self) -> &str {
        if self.status.is_empty() {
            if self.paused {
                "paused"
            } else if self.running {
                "running"
            } else {
                "exited"
            }
        } else {
            &self.status
        }
    }
}

/// A provisioned container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub image: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
}

impl Container {
    /// First 12 characters of the ID, as container tooling prints it.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

pub(crate) fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// One row of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub image: String,
    pub state: String,
    pub labels: HashMap<String, String>,
}

/// Everything needed to create (but not start) a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub labels: HashMap<String, String>,
    /// `KEY=value` entries.
    pub env: Vec<String>,
    /// `host_path:container_path` bind mounts.
    pub binds: Vec<String>,
}

/// Synchronous container engine operations consumed by the sandbox layer.
///
/// Implementations must be Send + Sync to allow sharing via `Arc<dyn ContainerEngine>`.
/// Calls against different container IDs may be issued concurrently.
pub trait ContainerEngine: Send + Sync {
    // === Images ===

    /// Whether an image with this name exists locally.
    fn image_exists(&self, name: &str) -> Result<bool, EngineError>;

    /// Forcibly remove a local image.
    fn remove_image(&self, name: &str) -> Result<(), EngineError>;

    /// Pull `repository:tag` from its registry.
    fn pull_image(&self, repository: &str, tag: &str) -> Result<(), EngineError>;

    /// Tag `source` as `target`, replacing any existing `target` tag.
    fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError>;

    // === Containers ===

    /// Create a container without starting it.
    fn create_container(&self, spec: &ContainerSpec) -> Result<Container, EngineError>;

    fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Send SIGKILL to the container's root process.
    fn kill_container(&self, id: &str) -> Result<(), EngineError>;

    fn pause_container(&self, id: &str) -> Result<(), EngineError>;

    fn unpause_container(&self, id: &str) -> Result<(), EngineError>;

    /// Remove a container, killing it first if it is still running.
    fn remove_container(&self, id: &str) -> Result<(), EngineError>;

    /// Fetch the authoritative current view of a container.
    fn inspect_container(&self, id: &str) -> Result<Container, EngineError>;

    /// List all containers, running or not. When `label` is given only
    /// containers carrying that `(key, value)` label are returned.
    fn list_containers(
        &self,
        label: Option<(&str, &str)>,
    ) -> Result<Vec<ContainerSummary>, EngineError>;
}
