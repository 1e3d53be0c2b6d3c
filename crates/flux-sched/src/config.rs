//! Adapter configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};

/// Which flavour of the Flux adapter to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluxVariant {
    /// Plain Flux: informational header, `flux wreckrun` launcher.
    #[default]
    #[serde(rename = "flux")]
    Flux,
    /// Flux on Spectrum MPI: `#SBATCH` header, host-file discovery and an
    /// external `mpirun` launcher.
    #[serde(rename = "flux-spectrum")]
    Spectrum,
}

impl FluxVariant {
    /// Registry key of the variant.
    pub fn key(&self) -> &'static str {
        match self {
            FluxVariant::Flux => "flux",
            FluxVariant::Spectrum => "flux-spectrum",
        }
    }

    /// Whether scheduled scripts of this variant write a host list file.
    pub fn discovers_hosts(&self) -> bool {
        matches!(self, FluxVariant::Spectrum)
    }
}

impl std::str::FromStr for FluxVariant {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flux" => Ok(FluxVariant::Flux),
            "flux-spectrum" => Ok(FluxVariant::Spectrum),
            other => Err(SchedError::ConfigError(format!(
                "unknown adapter variant '{other}' (expected 'flux' or 'flux-spectrum')"
            ))),
        }
    }
}

/// Default batch parameters applied to every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchParameters {
    /// Cluster to run on. Flux submits to the enclosing instance, so this
    /// is informational.
    pub host: Option<String>,

    /// Account to charge.
    pub bank: Option<String>,

    /// Queue to submit to.
    pub queue: Option<String>,

    /// Reservation; takes precedence over `bank` in script headers.
    pub reservation: Option<String>,

    /// Default node count when a step does not specify one.
    pub nodes: u32,
}

impl Default for BatchParameters {
    fn default() -> Self {
        Self {
            host: None,
            bank: None,
            queue: None,
            reservation: None,
            nodes: 1,
        }
    }
}

/// Configuration for the Flux adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxConfig {
    /// Adapter flavour.
    pub variant: FluxVariant,

    /// Batch defaults.
    #[serde(flatten)]
    pub batch: BatchParameters,

    /// Interpreter written on the first line of every script.
    pub shell: String,

    /// MPI launcher executable (required for `flux-spectrum`).
    pub mpi: Option<PathBuf>,

    /// Extra launcher arguments.
    pub args: Vec<String>,

    /// Environment variables starting with this prefix are not shipped
    /// with submitted jobs.
    pub env_prefix_filter: String,

    /// Path to the `flux` command.
    pub flux_program: PathBuf,

    /// Arguments placed between `flux_program` and the RPC topic when the
    /// command-line handle sends a remote procedure call.
    pub rpc_args: Vec<String>,

    /// Upper bound, in seconds, for every external command invocation.
    pub command_timeout_secs: u64,
}

impl Default for FluxConfig {
    fn default() -> Self {
        Self {
            variant: FluxVariant::default(),
            batch: BatchParameters::default(),
            shell: "/bin/bash".to_string(),
            mpi: None,
            args: Vec::new(),
            env_prefix_filter: "SSH_".to_string(),
            flux_program: PathBuf::from("flux"),
            rpc_args: vec!["rpc".to_string()],
            command_timeout_secs: 30,
        }
    }
}

impl FluxConfig {
    /// Create a configuration for the plain Flux adapter.
    pub fn flux() -> Self {
        Self::default()
    }

    /// Create a configuration for the Spectrum MPI adapter.
    pub fn spectrum(mpi: impl Into<PathBuf>) -> Self {
        Self {
            variant: FluxVariant::Spectrum,
            mpi: Some(mpi.into()),
            ..Default::default()
        }
    }

    /// Load a configuration from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> SchedResult<Self> {
        let config: FluxConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> SchedResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            SchedError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn with_bank(mut self, bank: impl Into<String>) -> Self {
        self.batch.bank = Some(bank.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.batch.queue = Some(queue.into());
        self
    }

    pub fn with_reservation(mut self, reservation: impl Into<String>) -> Self {
        self.batch.reservation = Some(reservation.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.batch.host = Some(host.into());
        self
    }

    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.batch.nodes = nodes;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_flux_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.flux_program = program.into();
        self
    }

    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// Time bound for external commands.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Interpreter line written at the top of scripts.
    pub fn shebang(&self) -> String {
        format!("#!{}", self.shell)
    }

    /// Check the configuration for settings the variant cannot work without.
    pub fn validate(&self) -> SchedResult<()> {
        if self.variant == FluxVariant::Spectrum && self.mpi.is_none() {
            return Err(SchedError::ConfigError(
                "flux-spectrum adapter requires an 'mpi' launcher".into(),
            ));
        }
        if self.batch.nodes == 0 {
            return Err(SchedError::ConfigError(
                "default node count must be at least 1".into(),
            ));
        }
        if self.shell.trim().is_empty() {
            return Err(SchedError::ConfigError("shell must not be empty".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(SchedError::ConfigError(
                "command_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FluxConfig::default();
        assert_eq!(config.variant, FluxVariant::Flux);
        assert_eq!(config.batch.nodes, 1);
        assert_eq!(config.shebang(), "#!/bin/bash");
        assert_eq!(config.env_prefix_filter, "SSH_");
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
variant: flux-spectrum
bank: physics
queue: pbatch
nodes: 4
mpi: /usr/tce/bin/mpirun
args: ["-gpu"]
"#;
        let config = FluxConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.variant, FluxVariant::Spectrum);
        assert_eq!(config.batch.bank.as_deref(), Some("physics"));
        assert_eq!(config.batch.queue.as_deref(), Some("pbatch"));
        assert_eq!(config.batch.nodes, 4);
        assert_eq!(config.args, vec!["-gpu"]);
        assert_eq!(config.shell, "/bin/bash");
    }

    #[test]
    fn test_spectrum_requires_mpi() {
        let result = FluxConfig::from_yaml_str("variant: flux-spectrum\n");
        assert!(matches!(result, Err(SchedError::ConfigError(_))));
        assert!(FluxConfig::spectrum("mpirun").validate().is_ok());
    }

    #[test]
    fn test_variant_keys() {
        assert_eq!(FluxVariant::Flux.key(), "flux");
        assert_eq!(FluxVariant::Spectrum.key(), "flux-spectrum");
        assert_eq!("flux-spectrum".parse::<FluxVariant>().unwrap(), FluxVariant::Spectrum);
        assert!("slurm".parse::<FluxVariant>().is_err());
        assert!(FluxVariant::Spectrum.discovers_hosts());
        assert!(!FluxVariant::Flux.discovers_hosts());
    }
}
