//! Connection to a Flux instance.
//!
//! The adapter talks to Flux through two channels on one handle: a
//! request/response RPC used for submission and path resolution, and reads
//! from the hierarchical key-value store where job state is published.

mod process;

pub use process::{ProcessConnector, ProcessHandle};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::SchedResult;

/// Failure reading from the key-value store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvsError {
    /// The key does not exist (job not yet visible, or expired).
    #[error("KVS key not found: {0}")]
    NotFound(String),

    /// The store could not be read at all.
    #[error("KVS I/O fault on {key}: {message}")]
    Io { key: String, message: String },
}

/// An open handle to a Flux instance.
///
/// Handles are not assumed to support concurrent calls; the adapter
/// serializes access to its handle.
#[async_trait]
pub trait FluxHandle: Send {
    /// Send one RPC and wait for its reply. `Ok(None)` means the call went
    /// through but nothing came back.
    async fn rpc(
        &mut self,
        topic: &str,
        payload: serde_json::Value,
    ) -> SchedResult<Option<serde_json::Value>>;

    /// Read one key from the KVS.
    async fn kvs_get(&mut self, key: &str) -> Result<serde_json::Value, KvsError>;
}

/// Opens handles. The adapter calls this at most once per instance.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> SchedResult<Box<dyn FluxHandle>>;
}
