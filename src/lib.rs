//! Sandbox lifecycle layer of a serverless worker.
//!
//! For each invocation the worker asks a [`SandboxManager`] to make the
//! handler's code available ([`SandboxManager::pull`]) and to provision a
//! container for it ([`SandboxManager::create`]). The returned [`Sandbox`] is
//! then started, paused, stopped and removed directly by its owner.
//!
//! The container runtime sits behind [`engine::ContainerEngine`]; the code
//! registry behind [`registry::PullClient`].

pub mod cmd;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod registry;
pub mod sandbox;

pub use config::{Config, RegistryMode};
pub use error::{
    AcquireError, ConfigError, InvalidHandlerName, Operation, ProvisionError, SandboxError,
};
pub use manager::SandboxManager;
pub use sandbox::{Sandbox, SandboxChannel, SandboxState};
