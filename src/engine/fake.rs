//! In-memory container engine (testing only).
//!
//! Records every call in order and keeps just enough container state to
//! drive the sandbox state machine. Failures can be injected per operation.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{
    Container, ContainerEngine, ContainerSpec, ContainerState, ContainerSummary, EngineError,
};

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<String>,
    images: HashSet<String>,
    containers: HashMap<String, Container>,
    specs: Vec<ContainerSpec>,
    failures: HashMap<&'static str, String>,
    next_id: u32,
}

#[derive(Debug, Default)]
pub struct FakeEngine {
    inner: Mutex<Inner>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_images(images: &[&str]) -> Self {
        let engine = Self::new();
        engine
            .inner
            .lock()
            .unwrap()
            .images
            .extend(images.iter().map(|s| s.to_string()));
        engine
    }

    /// Make every future call to `op` fail with `message`.
    pub fn fail(&self, op: &'static str, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(op, message.to_string());
    }

    pub fn clear_failure(&self, op: &'static str) {
        self.inner.lock().unwrap().failures.remove(op);
    }

    /// Calls recorded so far, as `op:arg` strings.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Specs passed to `create_container`.
    pub fn specs(&self) -> Vec<ContainerSpec> {
        self.inner.lock().unwrap().specs.clone()
    }

    pub fn has_image(&self, name: &str) -> bool {
        self.inner.lock().unwrap().images.contains(name)
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.inner.lock().unwrap().containers.contains_key(id)
    }

    /// Overwrite the engine-side state of a container behind the sandbox's back.
    pub fn set_state(&self, id: &str, state: ContainerState) {
        if let Some(c) = self.inner.lock().unwrap().containers.get_mut(id) {
            c.state = state;
        }
    }

    fn record(&self, op: &'static str, arg: &str) -> Result<MutexGuard<'_, Inner>, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("{}:{}", op, arg));
        if let Some(message) = inner.failures.get(op).cloned() {
            return Err(EngineError::Daemon(message));
        }
        Ok(inner)
    }

    fn update(
        &self,
        op: &'static str,
        id: &str,
        f: impl FnOnce(&mut ContainerState),
    ) -> Result<(), EngineError> {
        let mut inner = self.record(op, id)?;
        let container = inner
            .containers
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        f(&mut container.state);
        Ok(())
    }
}

impl ContainerEngine for FakeEngine {
    fn image_exists(&self, name: &str) -> Result<bool, EngineError> {
        let inner = self.record("image_exists", name)?;
        Ok(inner.images.contains(name))
    }

    fn remove_image(&self, name: &str) -> Result<(), EngineError> {
        let mut inner = self.record("remove_image", name)?;
        inner.images.remove(name);
        Ok(())
    }

    fn pull_image(&self, repository: &str, tag: &str) -> Result<(), EngineError> {
        let mut inner = self.record("pull_image", &format!("{}:{}", repository, tag))?;
        inner.images.insert(repository.to_string());
        Ok(())
    }

    fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError> {
        let mut inner = self.record("tag_image", &format!("{}->{}", source, target))?;
        if !inner.images.contains(source) {
            return Err(EngineError::NotFound(source.to_string()));
        }
        inner.images.insert(target.to_string());
        Ok(())
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<Container, EngineError> {
        let mut inner = self.record("create_container", &spec.image)?;
        if !inner.images.contains(&spec.image) {
            return Err(EngineError::NotFound(spec.image.clone()));
        }
        inner.next_id += 1;
        let container = Container {
            id: format!("{:064x}", inner.next_id),
            image: spec.image.clone(),
            state: ContainerState {
                status: "created".to_string(),
                ..Default::default()
            },
            labels: spec.labels.clone(),
        };
        inner.specs.push(spec.clone());
        inner
            .containers
            .insert(container.id.clone(), container.clone());
        Ok(container)
    }

    fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.update("start_container", id, |s| {
            s.status = "running".to_string();
            s.running = true;
            s.paused = false;
            s.pid = 4000;
        })
    }

    fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.update("kill_container", id, |s| {
            s.status = "exited".to_string();
            s.running = false;
            s.paused = false;
            s.pid = 0;
        })
    }

    fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        self.update("pause_container", id, |s| {
            s.status = "paused".to_string();
            s.paused = true;
        })
    }

    fn unpause_container(&self, id: &str) -> Result<(), EngineError> {
        self.update("unpause_container", id, |s| {
            s.status = "running".to_string();
            s.paused = false;
        })
    }

    fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        let mut inner = self.record("remove_container", id)?;
        inner
            .containers
            .remove(id)
            .map(drop)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    fn inspect_container(&self, id: &str) -> Result<Container, EngineError> {
        let inner = self.record("inspect_container", id)?;
        inner
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    fn list_containers(
        &self,
        label: Option<(&str, &str)>,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let inner = self.record("list_containers", "")?;
        let mut rows: Vec<ContainerSummary> = inner
            .containers
            .values()
            .filter(|c| match label {
                Some((k, v)) => c.labels.get(k).map(String::as_str) == Some(v),
                None => true,
            })
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                image: c.image.clone(),
                state: c.state.state_string().to_string(),
                labels: c.labels.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }
}
