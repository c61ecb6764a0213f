//! Handler code registry boundary.

use std::collections::HashMap;

/// Blob key under which a handler's gzip-compressed tarball is stored.
pub const HANDLER_KEY: &str = "handler";

/// Error reported by a registry pull client.
#[derive(Debug, thiserror::Error)]
#[error("registry pull failed: {0}")]
pub struct PullError(pub String);

/// Fetches the raw blobs published for a handler.
///
/// Implementations must be Send + Sync so one client can serve every
/// in-flight invocation.
pub trait PullClient: Send + Sync {
    /// Return every blob published under `name`, keyed by blob name.
    fn pull(&self, name: &str) -> Result<HashMap<String, Vec<u8>>, PullError>;
}
