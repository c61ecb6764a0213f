//! Docker CLI implementation of the container engine.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use super::{
    Container, ContainerEngine, ContainerSpec, ContainerState, ContainerSummary, EngineError,
};
use crate::cmd::{Cmd, CmdError};

/// Talks to the local container daemon through the `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Locate `docker` on PATH.
    pub fn new() -> Result<Self, which::Error> {
        let binary = which::which("docker")?;
        debug!(binary = %binary.display(), "docker:found");
        Ok(Self { binary })
    }

    /// Use an explicit binary (e.g. `podman`, which speaks the same CLI).
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run<I, S>(&self, args: I) -> Result<String, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let binary = self.binary.to_string_lossy();
        Cmd::new(&binary)
            .args(args)
            .run_and_capture_stdout()
            .map_err(classify)
    }
}

/// Turn a failed CLI invocation into the engine error it represents.
fn classify(err: CmdError) -> EngineError {
    match err.stderr() {
        Some(stderr) if stderr.contains("No such") => EngineError::NotFound(stderr.to_string()),
        Some(stderr) => EngineError::Daemon(stderr.to_string()),
        None => EngineError::Command(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    paused: bool,
    #[serde(default)]
    pid: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    image: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

/// One element of `docker container inspect` output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectContainer {
    id: String,
    state: InspectState,
    config: Option<InspectConfig>,
}

impl From<InspectContainer> for Container {
    fn from(raw: InspectContainer) -> Self {
        let (image, labels) = match raw.config {
            Some(config) => (config.image, config.labels.unwrap_or_default()),
            None => (String::new(), HashMap::new()),
        };
        Container {
            id: raw.id,
            image,
            state: ContainerState {
                status: raw.state.status,
                running: raw.state.running,
                paused: raw.state.paused,
                pid: raw.state.pid,
            },
            labels,
        }
    }
}

/// One row of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct PsRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    /// Comma separated `key=value` pairs.
    #[serde(rename = "Labels", default)]
    labels: String,
}

fn parse_labels(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Parse `docker container inspect` output (a JSON array).
pub(crate) fn parse_inspect(stdout: &str, id: &str) -> Result<Container, EngineError> {
    let mut rows: Vec<InspectContainer> =
        serde_json::from_str(stdout).map_err(|source| EngineError::Parse {
            what: "container inspect",
            source,
        })?;
    if rows.is_empty() {
        return Err(EngineError::NotFound(id.to_string()));
    }
    Ok(rows.swap_remove(0).into())
}

/// Parse NDJSON output from `docker ps --format '{{json .}}'` (one JSON object per line).
pub(crate) fn parse_ps(stdout: &str) -> Result<Vec<ContainerSummary>, EngineError> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            let row: PsRow = serde_json::from_str(l).map_err(|source| EngineError::Parse {
                what: "container list",
                source,
            })?;
            Ok(ContainerSummary {
                labels: parse_labels(&row.labels),
                id: row.id,
                image: row.image,
                state: row.state,
            })
        })
        .collect()
}

impl ContainerEngine for DockerCli {
    fn image_exists(&self, name: &str) -> Result<bool, EngineError> {
        match self.run(["image", "inspect", "--format", "{{.Id}}", name]) {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn remove_image(&self, name: &str) -> Result<(), EngineError> {
        self.run(["image", "rm", "--force", name]).map(drop)
    }

    fn pull_image(&self, repository: &str, tag: &str) -> Result<(), EngineError> {
        self.run(["pull".to_string(), format!("{}:{}", repository, tag)])
            .map(drop)
    }

    fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError> {
        self.run(["tag", source, target]).map(drop)
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<Container, EngineError> {
        let mut args = vec!["create".to_string()];
        let mut labels: Vec<_> = spec.labels.iter().collect();
        labels.sort();
        for (key, value) in labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        for env in &spec.env {
            args.push("--env".to_string());
            args.push(env.clone());
        }
        for bind in &spec.binds {
            args.push("--volume".to_string());
            args.push(bind.clone());
        }
        args.push(spec.image.clone());

        let id = self.run(args)?;
        debug!(image = %spec.image, container = %id, "docker:created");
        self.inspect_container(&id)
    }

    fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.run(["start", id]).map(drop)
    }

    fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.run(["kill", "--signal", "KILL", id]).map(drop)
    }

    fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        self.run(["pause", id]).map(drop)
    }

    fn unpause_container(&self, id: &str) -> Result<(), EngineError> {
        self.run(["unpause", id]).map(drop)
    }

    fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.run(["rm", "--force", id]).map(drop)
    }

    fn inspect_container(&self, id: &str) -> Result<Container, EngineError> {
        let stdout = self.run(["container", "inspect", id])?;
        parse_inspect(&stdout, id)
    }

    fn list_containers(
        &self,
        label: Option<(&str, &str)>,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let mut args = vec![
            "ps".to_string(),
            "--all".to_string(),
            "--no-trunc".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ];
        if let Some((key, value)) = label {
            args.push("--filter".to_string());
            args.push(format!("label={}={}", key, value));
        }
        let stdout = self.run(args)?;
        parse_ps(&stdout)
    }
}
