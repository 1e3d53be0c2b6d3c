//! Handle backed by the `flux` command-line tool.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::FluxConfig;
use crate::error::{SchedError, SchedResult};
use crate::handle::{Connector, FluxHandle, KvsError};

/// Error texts for ENOENT as printed by `flux kvs get`.
const ENOENT_MARKERS: [&str; 2] = ["No such file or directory", "ENOENT"];

/// Creates [`ProcessHandle`]s from the adapter configuration.
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    program: PathBuf,
    rpc_args: Vec<String>,
    timeout: Duration,
}

impl ProcessConnector {
    pub fn new(config: &FluxConfig) -> Self {
        Self {
            program: config.flux_program.clone(),
            rpc_args: config.rpc_args.clone(),
            timeout: config.command_timeout(),
        }
    }
}

#[async_trait]
impl Connector for ProcessConnector {
    async fn connect(&self) -> SchedResult<Box<dyn FluxHandle>> {
        debug!(program = %self.program.display(), "Opening command-line Flux handle");
        Ok(Box::new(ProcessHandle {
            program: self.program.clone(),
            rpc_args: self.rpc_args.clone(),
            timeout: self.timeout,
        }))
    }
}

/// Drives a Flux instance through its command-line tool.
///
/// KVS reads run `flux kvs get <key>`. RPCs run the configured bridge
/// command with the topic as its last argument, the JSON payload on stdin
/// and the JSON reply (or nothing) on stdout.
#[derive(Debug)]
pub struct ProcessHandle {
    program: PathBuf,
    rpc_args: Vec<String>,
    timeout: Duration,
}

#[async_trait]
impl FluxHandle for ProcessHandle {
    async fn rpc(
        &mut self,
        topic: &str,
        payload: serde_json::Value,
    ) -> SchedResult<Option<serde_json::Value>> {
        let rpc_error = |message: String| SchedError::RpcError {
            topic: topic.to_string(),
            message,
        };

        let request = serde_json::to_vec(&payload)?;

        // The stdin write shares the bound; the child may never read it.
        let exchange = async {
            let mut child = Command::new(&self.program)
                .args(&self.rpc_args)
                .arg(topic)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| rpc_error(e.to_string()))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&request)
                    .await
                    .map_err(|e| rpc_error(e.to_string()))?;
            }

            child
                .wait_with_output()
                .await
                .map_err(|e| rpc_error(e.to_string()))
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                SchedError::Timeout(format!(
                    "rpc {topic} timed out after {}s",
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(rpc_error(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let body = stdout.trim();
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(body)?))
    }

    async fn kvs_get(&mut self, key: &str) -> Result<serde_json::Value, KvsError> {
        let io_fault = |message: String| KvsError::Io {
            key: key.to_string(),
            message,
        };

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program)
                .args(["kvs", "get", key])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| io_fault(format!("timed out after {}s", self.timeout.as_secs())))?
        .map_err(|e| io_fault(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_key(&stderr, key) {
                return Err(KvsError::NotFound(key.to_string()));
            }
            return Err(io_fault(stderr.trim().to_string()));
        }

        Ok(parse_kvs_value(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// A missing key is reported as `<key>: No such file or directory`. The same
/// error text without the key (e.g. from `flux_open`) means the broker could
/// not be reached.
fn is_missing_key(stderr: &str, key: &str) -> bool {
    stderr.lines().any(|line| {
        line.split_once(key).is_some_and(|(_, rest)| {
            rest.starts_with(':') && ENOENT_MARKERS.iter().any(|m| rest.contains(m))
        })
    })
}

/// KVS values are JSON; bare strings are printed without quotes.
fn parse_kvs_value(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    serde_json::from_str(trimmed)
        .unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string()))
}
