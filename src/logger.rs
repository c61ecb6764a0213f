use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const APP_DIR: &str = "lambda-sandbox";
const LOG_FILE: &str = "worker.log";

/// Where log output goes.
#[derive(Debug, Default, Clone)]
pub struct LogOptions {
    /// Log file; defaults to the XDG state directory.
    pub file: Option<PathBuf>,
    /// Also echo events to stderr.
    pub stderr: bool,
}

impl LogOptions {
    /// Install the global subscriber. Events are flushed to the log file
    /// until the returned guard is dropped, so keep it alive in `main`.
    pub fn init(&self) -> Result<WorkerGuard> {
        let path = self.log_path()?;
        let (dir, file_name) = split_path(&path)?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory at {}", dir.display()))?;

        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, file_name));

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false);
        let stderr_layer = self
            .stderr
            .then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer)
            .try_init()
            .context("Failed to initialize tracing subscriber")?;

        Ok(guard)
    }

    /// The explicit file if one was given, else the first usable of
    /// `$XDG_STATE_HOME`, `~/.local/state` and the working directory.
    fn log_path(&self) -> Result<PathBuf> {
        if let Some(file) = &self.file {
            return Ok(file.clone());
        }
        let state_dir = std::env::var_os("XDG_STATE_HOME")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| home::home_dir().map(|home| home.join(".local").join("state")));
        match state_dir {
            Some(dir) => Ok(dir.join(APP_DIR).join(LOG_FILE)),
            None => Ok(std::env::current_dir()?.join(LOG_FILE)),
        }
    }
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name: {}", path.display()))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}
