//! Error types for the sandbox layer.
//!
//! Only [`ConfigError`] is fatal, and only at worker startup. Everything else
//! is returned to the caller handling the current invocation; nothing here is
//! retried internally.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::cmd::CmdError;
use crate::engine::EngineError;
use crate::registry::PullError;

/// Invalid worker configuration. Aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unrecognized registry type: {0}")]
    UnknownRegistryMode(String),

    #[error("registry mode '{0}' requires a registry pull client")]
    MissingPullClient(String),

    #[error("image {0} does not exist")]
    MissingBaseImage(String),

    #[error("could not check for image {image}: {source}")]
    BaseImageCheck {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),
}

/// Handler code could not be made available.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("failed to look up image {image}: {source}")]
    Inspect {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to remove stale image {image}: {source}")]
    RemoveImage {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to pull '{image}' from {registry} registry: {source}")]
    Pull {
        image: String,
        registry: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to re-tag '{registry}/{image}' as '{image}': {source}")]
    Tag {
        image: String,
        registry: String,
        #[source]
        source: EngineError,
    },

    /// Filesystem failure; the original error kind is preserved.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    InvalidName(#[from] InvalidHandlerName),

    #[error("failed to pull handler {name}: {source}")]
    Registry {
        name: String,
        #[source]
        source: PullError,
    },

    #[error("registry returned no '{key}' blob for handler {name}")]
    MissingBlob { name: String, key: &'static str },

    #[error("registry returned an empty '{key}' blob for handler {name}")]
    EmptyBlob { name: String, key: &'static str },

    #[error("failed to extract handler {name}: {source}")]
    Extract {
        name: String,
        #[source]
        source: CmdError,
    },
}

impl AcquireError {
    /// The underlying filesystem error kind, for filesystem failures.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            AcquireError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// A handler name that is not a single plain path component, and so cannot
/// name a directory under the handler root.
#[derive(Debug, thiserror::Error)]
#[error("invalid handler name '{0}'")]
pub struct InvalidHandlerName(pub String);

/// A container could not be provisioned for a handler.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    InvalidName(#[from] InvalidHandlerName),

    #[error("failed to create container for handler {name} from image {image}: {source}")]
    Create {
        name: String,
        image: String,
        #[source]
        source: EngineError,
    },
}

/// Lifecycle operation named in enriched errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
    Pause,
    Unpause,
    Remove,
    Channel,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Pause => "pause",
            Operation::Unpause => "unpause",
            Operation::Remove => "remove",
            Operation::Channel => "channel",
        };
        f.write_str(s)
    }
}

/// Failure of an operation on a provisioned sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Lifecycle failure, enriched with re-inspected state and container logs.
    #[error("{op} failed for container {container}: {message}")]
    Lifecycle {
        op: Operation,
        container: String,
        message: String,
    },

    #[error("could not inspect container {container}: {source}")]
    Inspect {
        container: String,
        #[source]
        source: EngineError,
    },

    #[error("could not read {}: {source}", .path.display())]
    Logs {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not move pid {pid} into cgroup of container {container}: {source}")]
    CGroup {
        container: String,
        pid: u32,
        #[source]
        source: CmdError,
    },

    #[error("container {0} has been removed")]
    Removed(String),
}
