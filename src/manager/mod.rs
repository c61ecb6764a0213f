//! Sandbox manager: pairs one code acquisition strategy with one sandbox
//! creation strategy, chosen once from the worker's registry mode.

mod code;
mod creator;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, RegistryMode};
use crate::engine::{ContainerEngine, EngineError, short_id};
use crate::error::{AcquireError, ConfigError, InvalidHandlerName, ProvisionError};
use crate::registry::PullClient;
use crate::sandbox::Sandbox;

pub use code::{CodeManager, ImageCodeManager, LocalCodeManager, RegistryCodeManager};
pub use creator::{BaseImageCreator, ContainerDefaults, NamedImageCreator, SandboxCreator};

/// Label carrying the worker's cluster name.
pub const LABEL_CLUSTER: &str = "ol.cluster";
/// Label marking a container as worker-managed.
pub const LABEL_TYPE: &str = "ol.type";
/// Value of [`LABEL_TYPE`] on every sandbox container.
pub const SANDBOX_TYPE: &str = "sandbox";
/// Shared image used when handler code is mounted rather than baked in.
pub const BASE_IMAGE: &str = "lambda";
/// Environment variable carrying the serialized sandbox configuration.
pub const CONFIG_ENV: &str = "ol.config";

/// `root/name`, provided `name` is a single plain path component.
///
/// Absolute names, separators, `.` and `..` would let a handler name point
/// outside `root`.
fn handler_path(root: &Path, name: &str) -> Result<PathBuf, InvalidHandlerName> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => {
            Ok(root.join(name))
        }
        _ => Err(InvalidHandlerName(name.to_string())),
    }
}

/// One line of [`SandboxManager::dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpEntry {
    pub image: String,
    pub short_id: String,
    pub state: String,
}

pub struct SandboxManager {
    engine: Arc<dyn ContainerEngine>,
    code: Box<dyn CodeManager>,
    creator: Box<dyn SandboxCreator>,
    mode: RegistryMode,
    cluster: String,
}

impl SandboxManager {
    /// Build the manager for `config`'s registry mode.
    ///
    /// Fails on an unknown mode, on a missing base image (for modes that
    /// mount handler code) and when `olregistry` mode has no pull client.
    /// Any of these must stop worker startup.
    pub fn new(
        config: &Config,
        engine: Arc<dyn ContainerEngine>,
        pull_client: Option<Arc<dyn PullClient>>,
    ) -> Result<Self, ConfigError> {
        let mode = config.registry_mode()?;

        let defaults = ContainerDefaults {
            engine: engine.clone(),
            labels: HashMap::from([
                (LABEL_CLUSTER.to_string(), config.cluster_name.clone()),
                (LABEL_TYPE.to_string(), SANDBOX_TYPE.to_string()),
            ]),
            env: vec![format!("{}={}", CONFIG_ENV, config.sandbox_conf_json())],
        };

        let (code, creator): (Box<dyn CodeManager>, Box<dyn SandboxCreator>) = match mode {
            RegistryMode::Image => (
                Box::new(ImageCodeManager::new(
                    config.registry_address(),
                    engine.clone(),
                    config.skip_pull_existing,
                )),
                Box::new(NamedImageCreator::new(defaults)),
            ),
            RegistryMode::Registry => {
                let client = pull_client
                    .ok_or_else(|| ConfigError::MissingPullClient(mode.as_str().to_string()))?;
                (
                    Box::new(RegistryCodeManager::new(client, config.reg_dir.clone())),
                    Box::new(BaseImageCreator::new(defaults, config.reg_dir.clone())?),
                )
            }
            RegistryMode::Local => (
                Box::new(LocalCodeManager::new(config.reg_dir.clone())),
                Box::new(BaseImageCreator::new(defaults, config.reg_dir.clone())?),
            ),
        };

        info!(mode = mode.as_str(), cluster = %config.cluster_name, "manager:ready");
        Ok(Self {
            engine,
            code,
            creator,
            mode,
            cluster: config.cluster_name.clone(),
        })
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    /// Make `name`'s code available for [`SandboxManager::create`].
    pub fn pull(&self, name: &str) -> Result<(), AcquireError> {
        self.code.pull(name)
    }

    /// Provision an unstarted sandbox for `name` whose host side lives in `sandbox_dir`.
    pub fn create(&self, name: &str, sandbox_dir: &Path) -> Result<Sandbox, ProvisionError> {
        self.creator.create(name, sandbox_dir)
    }

    /// The engine client shared by every sandbox this manager creates.
    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    /// Log and return every container known to the engine.
    pub fn dump(&self) -> Result<Vec<DumpEntry>, EngineError> {
        self.dump_filtered(None)
    }

    /// Like [`SandboxManager::dump`], limited to this worker's cluster.
    pub fn dump_cluster(&self) -> Result<Vec<DumpEntry>, EngineError> {
        self.dump_filtered(Some((LABEL_CLUSTER, self.cluster.as_str())))
    }

    fn dump_filtered(&self, label: Option<(&str, &str)>) -> Result<Vec<DumpEntry>, EngineError> {
        let rows = self.engine.list_containers(label)?;
        info!("=====================================");
        let mut entries = Vec::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            // The listing can lag behind; ask for the current state but keep
            // going with the listed one if the container vanished meanwhile.
            let state = match self.engine.inspect_container(&row.id) {
                Ok(container) => container.state.state_string().to_string(),
                Err(e) => {
                    warn!(container = %row.id, error = %e, "manager:dump inspect failed");
                    row.state.clone()
                }
            };
            let entry = DumpEntry {
                short_id: short_id(&row.id).to_string(),
                image: row.image,
                state,
            };
            info!("CONTAINER {}: {}, {}, {}", idx, entry.image, entry.short_id, entry.state);
            entries.push(entry);
        }
        Ok(entries)
    }
}
