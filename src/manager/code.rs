//! Code acquisition strategies used by [`SandboxManager::pull`](super::SandboxManager::pull).
//!
//! Each strategy makes a named handler's code available for sandbox creation:
//! as a local image, as an existing directory, or as a freshly unpacked tarball.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use super::handler_path;

use crate::cmd::Cmd;
use crate::engine::ContainerEngine;
use crate::error::AcquireError;
use crate::registry::{HANDLER_KEY, PullClient};

/// Makes a handler's code available before its sandbox is created.
pub trait CodeManager: Send + Sync {
    fn pull(&self, name: &str) -> Result<(), AcquireError>;
}

/// Pulls one image per handler from a container registry.
pub struct ImageCodeManager {
    registry: String,
    engine: Arc<dyn ContainerEngine>,
    skip_existing: bool,
}

impl ImageCodeManager {
    pub fn new(registry: String, engine: Arc<dyn ContainerEngine>, skip_existing: bool) -> Self {
        Self {
            registry,
            engine,
            skip_existing,
        }
    }

    /// Pull `{registry}/{name}:latest` and re-tag it as plain `name` so
    /// containers can be created by handler name.
    fn pull_and_tag(&self, name: &str) -> Result<(), AcquireError> {
        let remote = format!("{}/{}", self.registry, name);

        self.engine
            .pull_image(&remote, "latest")
            .map_err(|source| AcquireError::Pull {
                image: name.to_string(),
                registry: self.registry.clone(),
                source,
            })?;

        self.engine
            .tag_image(&remote, name)
            .map_err(|source| AcquireError::Tag {
                image: name.to_string(),
                registry: self.registry.clone(),
                source,
            })
    }
}

impl CodeManager for ImageCodeManager {
    fn pull(&self, name: &str) -> Result<(), AcquireError> {
        let exists = self
            .engine
            .image_exists(name)
            .map_err(|source| AcquireError::Inspect {
                image: name.to_string(),
                source,
            })?;

        if exists {
            if self.skip_existing {
                debug!(image = name, "code:image present, skipping pull");
                return Ok(());
            }
            self.engine
                .remove_image(name)
                .map_err(|source| AcquireError::RemoveImage {
                    image: name.to_string(),
                    source,
                })?;
        }

        self.pull_and_tag(name)?;
        info!(image = name, registry = %self.registry, "code:image pulled");
        Ok(())
    }
}

/// Serves handlers already unpacked under a local directory.
pub struct LocalCodeManager {
    handler_dir: PathBuf,
}

impl LocalCodeManager {
    pub fn new(handler_dir: PathBuf) -> Self {
        Self { handler_dir }
    }
}

impl CodeManager for LocalCodeManager {
    fn pull(&self, name: &str) -> Result<(), AcquireError> {
        let path = handler_path(&self.handler_dir, name)?;
        fs::metadata(&path)
            .map(drop)
            .map_err(|source| AcquireError::Io { path, source })
    }
}

/// Downloads handler tarballs from the code registry and unpacks them under
/// `handler_dir/<name>`.
pub struct RegistryCodeManager {
    client: Arc<dyn PullClient>,
    handler_dir: PathBuf,
}

impl RegistryCodeManager {
    pub fn new(client: Arc<dyn PullClient>, handler_dir: PathBuf) -> Self {
        Self {
            client,
            handler_dir,
        }
    }
}

impl CodeManager for RegistryCodeManager {
    fn pull(&self, name: &str) -> Result<(), AcquireError> {
        let dir = handler_path(&self.handler_dir, name)?;
        // Not create_dir_all: a second pull of the same handler must fail
        // rather than unpack over existing code.
        fs::create_dir(&dir).map_err(|source| AcquireError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut blobs = self
            .client
            .pull(name)
            .map_err(|source| AcquireError::Registry {
                name: name.to_string(),
                source,
            })?;

        let handler = blobs
            .remove(HANDLER_KEY)
            .ok_or_else(|| AcquireError::MissingBlob {
                name: name.to_string(),
                key: HANDLER_KEY,
            })?;
        if handler.is_empty() {
            return Err(AcquireError::EmptyBlob {
                name: name.to_string(),
                key: HANDLER_KEY,
            });
        }

        let target = dir.to_string_lossy().into_owned();
        Cmd::new("tar")
            .args(["-xzf", "-", "--directory", target.as_str()])
            .stdin(&handler)
            .run()
            .map_err(|source| AcquireError::Extract {
                name: name.to_string(),
                source,
            })?;

        info!(
            handler = name,
            dir = %dir.display(),
            bytes = handler.len(),
            "code:handler extracted"
        );
        Ok(())
    }
}
