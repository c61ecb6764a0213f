//! Lifecycle control for one provisioned container.
//!
//! A [`Sandbox`] is created (unstarted) by a creation strategy and then
//! driven directly by its owner. Its cached container snapshot is advisory:
//! every decision re-queries the engine first.
//!
//! Lifecycle methods take `&mut self`, so calls on one sandbox are serialized
//! by its owner. Different sandboxes may be driven from different threads.

mod cgroup;
mod channel;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::engine::{Container, ContainerEngine, ContainerState, EngineError};
use crate::error::{Operation, SandboxError};

pub use cgroup::CONTROLLERS;
pub use channel::SandboxChannel;

/// Control socket the sandboxed runtime listens on.
pub const SOCKET_FILE: &str = "ol.sock";
/// Files the sandboxed runtime writes its output to.
pub const STDOUT_FILE: &str = "stdout";
pub const STDERR_FILE: &str = "stderr";

/// Lifecycle state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Provisioned but never started.
    Created,
    Running,
    Paused,
    Stopped,
}

impl SandboxState {
    /// Classify an engine-reported container state.
    pub fn from_container(state: &ContainerState) -> Self {
        match (state.running, state.paused) {
            (true, true) => SandboxState::Paused,
            (true, false) => SandboxState::Running,
            (false, _) if state.status == "created" => SandboxState::Created,
            (false, _) => SandboxState::Stopped,
        }
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SandboxState::Created => "created",
            SandboxState::Running => "running",
            SandboxState::Paused => "paused",
            SandboxState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

pub struct Sandbox {
    name: String,
    sandbox_dir: PathBuf,
    /// Authoritative identity; never changes after creation.
    id: String,
    /// Last snapshot fetched from the engine. May be stale.
    container: Container,
    engine: Arc<dyn ContainerEngine>,
    /// Host PID of the container's root process, set by `start`.
    ns_pid: Option<u32>,
    removed: bool,
}

impl Sandbox {
    pub fn new(
        name: String,
        sandbox_dir: PathBuf,
        container: Container,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        Self {
            name,
            sandbox_dir,
            id: container.id.clone(),
            container,
            engine,
            ns_pid: None,
            removed: false,
        }
    }

    /// Handler this sandbox runs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sandbox_dir(&self) -> &Path {
        &self.sandbox_dir
    }

    pub fn container_id(&self) -> &str {
        &self.id
    }

    /// Host PID of the container's root process. `None` until started.
    pub fn ns_pid(&self) -> Option<u32> {
        self.ns_pid
    }

    /// Last fetched container snapshot. Call [`Sandbox::inspect_update`]
    /// before relying on it.
    pub fn cached(&self) -> &Container {
        &self.container
    }

    fn ensure_live(&self) -> Result<(), SandboxError> {
        if self.removed {
            return Err(SandboxError::Removed(self.id.clone()));
        }
        Ok(())
    }

    /// Refresh the cached snapshot from the engine.
    pub fn inspect_update(&mut self) -> Result<(), EngineError> {
        let container = self.engine.inspect_container(&self.id)?;
        debug!(container = %self.id, state = %container.state.state_string(), "sandbox:inspected");
        self.container = container;
        Ok(())
    }

    /// Current state, always re-queried from the engine.
    pub fn state(&mut self) -> Result<SandboxState, SandboxError> {
        self.ensure_live()?;
        self.inspect_update().map_err(|source| SandboxError::Inspect {
            container: self.id.clone(),
            source,
        })?;
        Ok(SandboxState::from_container(&self.container.state))
    }

    /// Run one engine call, enriching any failure with diagnostics.
    fn lifecycle<T>(
        &mut self,
        op: Operation,
        call: impl FnOnce(&dyn ContainerEngine, &str) -> Result<T, EngineError>,
    ) -> Result<T, SandboxError> {
        self.ensure_live()?;
        let engine = Arc::clone(&self.engine);
        match call(engine.as_ref(), &self.id) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(
                    container = %self.id,
                    handler = %self.name,
                    %op,
                    error = %err,
                    "sandbox:operation failed"
                );
                Err(self.diagnose(op, &err))
            }
        }
    }

    /// Wrap `outer` with the container's current state and its logs.
    ///
    /// Both lookups are best-effort: if either fails a note replaces it and
    /// the original error is still reported.
    fn diagnose(&mut self, op: Operation, outer: &dyn fmt::Display) -> SandboxError {
        let mut message = format!("{}.  ", outer);

        match self.inspect_update() {
            Ok(()) => message.push_str(&format!(
                "Container state is <{}>.  ",
                self.container.state.state_string()
            )),
            Err(e) => {
                warn!(container = %self.id, error = %e, "sandbox:diagnostic inspect failed");
                message.push_str(&format!("Could not inspect container ({}).  ", e));
            }
        }

        message.push('\n');
        for stream in [STDOUT_FILE, STDERR_FILE] {
            match self.read_log(stream) {
                Ok(contents) => message.push_str(&self.log_section(stream, &contents)),
                Err(e) => {
                    warn!(
                        container = %self.id,
                        stream,
                        error = %e,
                        "sandbox:diagnostic logs unavailable"
                    );
                    message.push_str(&format!(
                        "Could not fetch [{}] {} logs ({})!\n",
                        self.id, stream, e
                    ));
                }
            }
        }

        SandboxError::Lifecycle {
            op,
            container: self.id.clone(),
            message,
        }
    }

    fn read_log(&self, stream: &str) -> Result<String, SandboxError> {
        let path = self.sandbox_dir.join(stream);
        fs::read(&path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|source| SandboxError::Logs { path, source })
    }

    fn log_section(&self, stream: &str, contents: &str) -> String {
        let mut section = format!("<--- Start handler container [{}] {} --->\n", self.id, stream);
        section.push_str(contents);
        if !contents.is_empty() && !contents.ends_with('\n') {
            section.push('\n');
        }
        section.push_str(&format!("<--- End handler container [{}] {} --->\n", self.id, stream));
        section
    }

    /// The sandbox's stdout and stderr, each between markers naming the container.
    pub fn logs(&self) -> Result<String, SandboxError> {
        let stdout = self.read_log(STDOUT_FILE)?;
        let stderr = self.read_log(STDERR_FILE)?;
        Ok(format!(
            "{}{}",
            self.log_section(STDOUT_FILE, &stdout),
            self.log_section(STDERR_FILE, &stderr)
        ))
    }

    /// Start the container and record the host PID of its root process.
    pub fn start(&mut self) -> Result<(), SandboxError> {
        self.lifecycle(Operation::Start, |engine, id| engine.start_container(id))?;
        let container =
            self.lifecycle(Operation::Start, |engine, id| engine.inspect_container(id))?;
        self.ns_pid = (container.state.pid != 0).then_some(container.state.pid);
        self.container = container;
        info!(container = %self.id, handler = %self.name, pid = ?self.ns_pid, "sandbox:started");
        Ok(())
    }

    /// Kill the container (SIGKILL, no graceful shutdown).
    pub fn stop(&mut self) -> Result<(), SandboxError> {
        self.lifecycle(Operation::Stop, |engine, id| engine.kill_container(id))?;
        self.ns_pid = None;
        info!(container = %self.id, "sandbox:stopped");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SandboxError> {
        self.lifecycle(Operation::Pause, |engine, id| engine.pause_container(id))?;
        debug!(container = %self.id, "sandbox:paused");
        Ok(())
    }

    pub fn unpause(&mut self) -> Result<(), SandboxError> {
        self.lifecycle(Operation::Unpause, |engine, id| engine.unpause_container(id))?;
        debug!(container = %self.id, "sandbox:unpaused");
        Ok(())
    }

    /// Destroy the container, running or not. Every later call except
    /// [`Sandbox::logs`] fails with [`SandboxError::Removed`].
    pub fn remove(&mut self) -> Result<(), SandboxError> {
        self.lifecycle(Operation::Remove, |engine, id| engine.remove_container(id))?;
        self.removed = true;
        self.ns_pid = None;
        info!(container = %self.id, handler = %self.name, "sandbox:removed");
        Ok(())
    }

    /// Open a channel to the sandbox's control socket.
    ///
    /// No connection is attempted here; the first request may fail if nothing
    /// is listening yet.
    pub fn channel(&mut self) -> Result<SandboxChannel, SandboxError> {
        self.ensure_live()?;
        if let Err(e) = self.inspect_update() {
            return Err(self.diagnose(Operation::Channel, &e));
        }
        Ok(SandboxChannel::new(self.sandbox_dir.join(SOCKET_FILE)))
    }

    /// Move an external process into this container's cgroups so it is
    /// subject to the same limits. Children of `pid` inherit the membership.
    pub fn cgroup_enter(&self, pid: u32) -> Result<(), SandboxError> {
        self.ensure_live()?;
        cgroup::classify(&self.id, pid).map_err(|source| SandboxError::CGroup {
            container: self.id.clone(),
            pid,
            source,
        })?;
        debug!(container = %self.id, pid, "sandbox:cgroup entered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ContainerSpec;
    use crate::engine::fake::FakeEngine;

    struct Fixture {
        engine: Arc<FakeEngine>,
        sandbox: Sandbox,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::with_images(&["func1"]));
        let container = engine
            .create_container(&ContainerSpec {
                image: "func1".to_string(),
                ..Default::default()
            })
            .unwrap();
        let sandbox = Sandbox::new(
            "func1".to_string(),
            dir.path().to_path_buf(),
            container,
            engine.clone(),
        );
        Fixture {
            engine,
            sandbox,
            _dir: dir,
        }
    }

    fn write_logs(sandbox: &Sandbox) {
        fs::write(sandbox.sandbox_dir().join(STDOUT_FILE), "handler ready\n").unwrap();
        fs::write(sandbox.sandbox_dir().join(STDERR_FILE), "Traceback: boom").unwrap();
    }

    #[test]
    fn test_classification() {
        let state = |status: &str, running, paused| ContainerState {
            status: status.to_string(),
            running,
            paused,
            pid: 0,
        };
        let cases = [
            (state("paused", true, true), SandboxState::Paused),
            (state("running", true, false), SandboxState::Running),
            (state("exited", false, false), SandboxState::Stopped),
            (state("dead", false, true), SandboxState::Stopped),
            (state("created", false, false), SandboxState::Created),
        ];
        for (engine_state, expected) in cases {
            assert_eq!(SandboxState::from_container(&engine_state), expected);
        }
    }

    #[test]
    fn test_fresh_sandbox_is_created_and_has_no_pid() {
        let mut f = fixture();
        assert_eq!(f.sandbox.ns_pid(), None);
        assert_eq!(f.sandbox.state().unwrap(), SandboxState::Created);
    }

    #[test]
    fn test_start_reports_running_and_records_pid() {
        let mut f = fixture();
        f.sandbox.start().unwrap();
        assert_eq!(f.sandbox.state().unwrap(), SandboxState::Running);
        assert_eq!(f.sandbox.ns_pid(), Some(4000));
    }

    #[test]
    fn test_pause_then_unpause_returns_to_running() {
        let mut f = fixture();
        f.sandbox.start().unwrap();
        f.sandbox.pause().unwrap();
        assert_eq!(f.sandbox.state().unwrap(), SandboxState::Paused);
        f.sandbox.unpause().unwrap();
        assert_eq!(f.sandbox.state().unwrap(), SandboxState::Running);
    }

    #[test]
    fn test_stop_uses_kill() {
        let mut f = fixture();
        f.sandbox.start().unwrap();
        f.sandbox.stop().unwrap();
        assert_eq!(f.sandbox.state().unwrap(), SandboxState::Stopped);
        assert!(f.engine.calls().iter().any(|c| c.starts_with("kill_container:")));
        assert_eq!(f.sandbox.ns_pid(), None);
    }

    #[test]
    fn test_state_ignores_stale_cache() {
        let mut f = fixture();
        f.sandbox.start().unwrap();
        assert!(f.sandbox.cached().state.running);

        let id = f.sandbox.container_id().to_string();
        f.engine.set_state(
            &id,
            ContainerState {
                status: "exited".to_string(),
                ..Default::default()
            },
        );
        assert!(f.sandbox.cached().state.running);
        assert_eq!(f.sandbox.state().unwrap(), SandboxState::Stopped);
        assert!(!f.sandbox.cached().state.running);
        assert_eq!(f.sandbox.container_id(), id);
    }

    #[test]
    fn test_failed_start_is_enriched_with_state_and_logs() {
        let mut f = fixture();
        write_logs(&f.sandbox);
        f.engine.fail("start_container", "exec format error");

        let err = f.sandbox.start().unwrap_err();
        let msg = err.to_string();
        let id = f.sandbox.container_id();
        assert!(matches!(err, SandboxError::Lifecycle { op: Operation::Start, .. }));
        assert!(msg.contains("exec format error"));
        assert!(msg.contains("Container state is <created>"));
        assert!(msg.contains(&format!("<--- Start handler container [{}] stdout --->", id)));
        assert!(msg.contains("handler ready"));
        assert!(msg.contains(&format!("<--- End handler container [{}] stderr --->", id)));
        assert!(msg.contains("Traceback: boom"));
        assert_eq!(f.sandbox.ns_pid(), None);
    }

    #[test]
    fn test_failed_inspect_during_diagnosis_keeps_original_error() {
        let mut f = fixture();
        f.engine.fail("pause_container", "cannot pause");
        f.engine.fail("inspect_container", "daemon gone");

        let msg = f.sandbox.pause().unwrap_err().to_string();
        assert!(msg.contains("cannot pause"));
        assert!(msg.contains("Could not inspect container"));
        assert!(msg.contains("daemon gone"));
        // No log files were written.
        assert!(msg.contains("stdout logs"));
        assert!(msg.contains("stderr logs"));
    }

    #[test]
    fn test_partial_logs_still_reported() {
        let mut f = fixture();
        fs::write(f.sandbox.sandbox_dir().join(STDOUT_FILE), "only stdout").unwrap();
        f.engine.fail("kill_container", "no such process");

        let msg = f.sandbox.stop().unwrap_err().to_string();
        assert!(msg.contains("only stdout"));
        assert!(msg.contains("stderr logs"));
    }

    #[test]
    fn test_logs_format_and_missing_file() {
        let f = fixture();
        assert!(matches!(f.sandbox.logs().unwrap_err(), SandboxError::Logs { .. }));

        write_logs(&f.sandbox);
        let logs = f.sandbox.logs().unwrap();
        let id = f.sandbox.container_id();
        let expected = format!(
            "<--- Start handler container [{id}] stdout --->\nhandler ready\n\
             <--- End handler container [{id}] stdout --->\n\
             <--- Start handler container [{id}] stderr --->\nTraceback: boom\n\
             <--- End handler container [{id}] stderr --->\n"
        );
        assert_eq!(logs, expected);
    }

    #[test]
    fn test_remove_running_container_then_reject_further_use() {
        let mut f = fixture();
        f.sandbox.start().unwrap();
        f.sandbox.remove().unwrap();

        let id = f.sandbox.container_id().to_string();
        assert!(!f.engine.has_container(&id));
        assert!(matches!(f.sandbox.state(), Err(SandboxError::Removed(_))));
        assert!(matches!(f.sandbox.start(), Err(SandboxError::Removed(_))));
        assert!(matches!(f.sandbox.channel(), Err(SandboxError::Removed(_))));
    }

    #[test]
    fn test_failed_remove_keeps_sandbox_usable() {
        let mut f = fixture();
        f.engine.fail("remove_container", "device busy");
        assert!(f.sandbox.remove().is_err());

        f.engine.clear_failure("remove_container");
        f.sandbox.remove().unwrap();
    }

    #[test]
    fn test_channel_points_at_control_socket() {
        let mut f = fixture();
        let channel = f.sandbox.channel().unwrap();
        assert_eq!(channel.socket_path(), f.sandbox.sandbox_dir().join(SOCKET_FILE));
        assert_eq!(channel.url(), "http://container");
    }

    #[test]
    fn test_channel_requires_inspectable_container() {
        let mut f = fixture();
        f.engine.fail("inspect_container", "daemon gone");
        let err = f.sandbox.channel().unwrap_err();
        assert!(matches!(err, SandboxError::Lifecycle { op: Operation::Channel, .. }));
    }

    #[test]
    fn test_sandbox_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Sandbox>();
    }
}
