//! Error handling for the Flux adapter.

use thiserror::Error;

/// Result type for adapter operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur while building, submitting or tracking Flux jobs.
///
/// Only configuration-class failures and local I/O surface as `Err`.
/// Remote-side failures (rejected submissions, storage faults, refused
/// cancellations) are reported through the typed codes in [`crate::status`].
#[derive(Error, Debug)]
pub enum SchedError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Walltime string could not be parsed.
    #[error("Invalid walltime '{0}': expected HH:MM:SS")]
    InvalidWalltime(String),

    /// Resource request is inconsistent or empty.
    #[error("Invalid resources: {0}")]
    InvalidResources(String),

    /// Job list input was neither an identifier nor a list of identifiers.
    #[error("Invalid job list: {0}")]
    InvalidJobList(String),

    /// Could not establish the scheduler handle.
    #[error("Failed to connect to Flux: {0}")]
    ConnectError(String),

    /// Remote procedure call failed at the transport level.
    #[error("RPC '{topic}' failed: {message}")]
    RpcError { topic: String, message: String },

    /// External command could not be executed.
    #[error("Command failed: {command} - {message}")]
    CommandError { command: String, message: String },

    /// External invocation exceeded its time bound.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    YamlError(String),
}

impl From<serde_yaml_ng::Error> for SchedError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        SchedError::YamlError(e.to_string())
    }
}

impl SchedError {
    /// Whether this error was raised while validating input, before any
    /// remote call was attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SchedError::ConfigError(_)
                | SchedError::InvalidWalltime(_)
                | SchedError::InvalidResources(_)
                | SchedError::InvalidJobList(_)
                | SchedError::YamlError(_)
        )
    }
}
