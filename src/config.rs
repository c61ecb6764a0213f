use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::ConfigError;

/// How handler code reaches a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    /// One image per handler, pulled from a container registry (`docker`).
    Image,
    /// Handler tarballs pulled from the code registry and unpacked on disk (`olregistry`).
    Registry,
    /// Handler directories already present on disk (`local`).
    Local,
}

impl RegistryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryMode::Image => "docker",
            RegistryMode::Registry => "olregistry",
            RegistryMode::Local => "local",
        }
    }
}

impl FromStr for RegistryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(RegistryMode::Image),
            "olregistry" => Ok(RegistryMode::Registry),
            "local" => Ok(RegistryMode::Local),
            other => Err(ConfigError::UnknownRegistryMode(other.to_string())),
        }
    }
}

/// Worker options consumed by the sandbox layer, read from a YAML (or JSON) file.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Registry mode: `docker`, `olregistry` or `local`.
    /// Kept as a string so an unknown value is reported when the manager is built.
    pub registry: String,

    /// Container registry host, used in `docker` mode
    #[serde(default)]
    pub registry_host: String,

    /// Container registry port, used in `docker` mode
    #[serde(default)]
    pub registry_port: String,

    /// Cluster identity stamped on every created container
    #[serde(default)]
    pub cluster_name: String,

    /// Keep an already present handler image instead of re-pulling it
    #[serde(default)]
    pub skip_pull_existing: bool,

    /// Root directory holding one subdirectory per handler
    #[serde(default)]
    pub reg_dir: PathBuf,

    /// Addresses of the code registry cluster, used in `olregistry` mode
    #[serde(default)]
    pub reg_cluster: Vec<String>,

    /// Options forwarded verbatim to every sandbox through its environment
    #[serde(default = "empty_object")]
    pub sandbox: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    pub fn registry_mode(&self) -> Result<RegistryMode, ConfigError> {
        self.registry.parse()
    }

    /// `host:port` of the container registry.
    pub fn registry_address(&self) -> String {
        format!("{}:{}", self.registry_host, self.registry_port)
    }

    /// The `sandbox` section serialized as compact JSON.
    pub fn sandbox_conf_json(&self) -> String {
        // Serializing a `Value` cannot fail; fall back to an empty object anyway.
        serde_json::to_string(&self.sandbox).unwrap_or_else(|_| "{}".to_string())
    }
}
