//! Sandbox creation strategies used by [`SandboxManager::create`](super::SandboxManager::create).
//!
//! Creators provision a container and wrap it in a [`Sandbox`]. They never
//! start it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::{BASE_IMAGE, handler_path};
use crate::engine::{ContainerEngine, ContainerSpec};
use crate::error::{ConfigError, ProvisionError};
use crate::sandbox::Sandbox;

/// Provisions an unstarted container for a handler.
pub trait SandboxCreator: Send + Sync {
    fn create(&self, name: &str, sandbox_dir: &Path) -> Result<Sandbox, ProvisionError>;
}

/// Labels and environment shared by every container a worker creates.
#[derive(Clone)]
pub struct ContainerDefaults {
    pub engine: Arc<dyn ContainerEngine>,
    /// Identifies the cluster and marks the container as a sandbox.
    pub labels: HashMap<String, String>,
    pub env: Vec<String>,
}

impl ContainerDefaults {
    fn provision(
        &self,
        name: &str,
        image: &str,
        sandbox_dir: &Path,
        binds: Vec<String>,
    ) -> Result<Sandbox, ProvisionError> {
        let spec = ContainerSpec {
            image: image.to_string(),
            labels: self.labels.clone(),
            env: self.env.clone(),
            binds,
        };
        let container = self
            .engine
            .create_container(&spec)
            .map_err(|source| ProvisionError::Create {
                name: name.to_string(),
                image: image.to_string(),
                source,
            })?;
        info!(
            handler = name,
            image,
            container = %container.short_id(),
            "creator:container created"
        );
        Ok(Sandbox::new(
            name.to_string(),
            sandbox_dir.to_path_buf(),
            container,
            self.engine.clone(),
        ))
    }
}

fn bind(host: &Path, guest: &str) -> String {
    format!("{}:{}", host.display(), guest)
}

/// Creates sandboxes from an image named after the handler.
pub struct NamedImageCreator {
    defaults: ContainerDefaults,
}

impl NamedImageCreator {
    pub fn new(defaults: ContainerDefaults) -> Self {
        Self { defaults }
    }
}

impl SandboxCreator for NamedImageCreator {
    fn create(&self, name: &str, sandbox_dir: &Path) -> Result<Sandbox, ProvisionError> {
        let binds = vec![bind(sandbox_dir, "/host")];
        self.defaults.provision(name, name, sandbox_dir, binds)
    }
}

/// Creates sandboxes from the shared base image, mounting the handler's
/// unpacked code at `/handler`.
pub struct BaseImageCreator {
    defaults: ContainerDefaults,
    handler_dir: PathBuf,
}

impl BaseImageCreator {
    /// Fails when the base image is not present: without it no sandbox can
    /// ever be created, so the worker must not start.
    pub fn new(defaults: ContainerDefaults, handler_dir: PathBuf) -> Result<Self, ConfigError> {
        let exists = defaults
            .engine
            .image_exists(BASE_IMAGE)
            .map_err(|source| ConfigError::BaseImageCheck {
                image: BASE_IMAGE.to_string(),
                source,
            })?;
        if !exists {
            return Err(ConfigError::MissingBaseImage(BASE_IMAGE.to_string()));
        }
        Ok(Self {
            defaults,
            handler_dir,
        })
    }
}

impl SandboxCreator for BaseImageCreator {
    fn create(&self, name: &str, sandbox_dir: &Path) -> Result<Sandbox, ProvisionError> {
        let code = handler_path(&self.handler_dir, name)?;
        let binds = vec![bind(&code, "/handler"), bind(sandbox_dir, "/host")];
        self.defaults.provision(name, BASE_IMAGE, sandbox_dir, binds)
    }
}
