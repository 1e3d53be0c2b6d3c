//! Shared helpers for CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use flux_sched::{FluxAdapter, FluxConfig, StepDescription};

/// Location of the per-user configuration file, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("flux-sched").join("config.yaml"))
}

/// Load the adapter configuration.
///
/// An explicit path must exist. Without one, the per-user file is used when
/// present and the built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<FluxConfig> {
    if let Some(path) = path {
        return FluxConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()));
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "Using user configuration");
            FluxConfig::from_yaml_file(&path)
                .with_context(|| format!("Failed to load configuration: {}", path.display()))
        }
        _ => {
            debug!("No configuration file found, using defaults");
            Ok(FluxConfig::default())
        }
    }
}

/// Build an adapter from the configuration at `path`.
pub fn create_adapter(path: Option<&Path>) -> Result<FluxAdapter> {
    let config = load_config(path)?;
    FluxAdapter::new(config).map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))
}

/// Load a step description from a YAML file.
pub fn load_step(path: &Path) -> Result<StepDescription> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    StepDescription::from_yaml_file(path)
        .with_context(|| format!("Failed to load step: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "variant: flux\nbank: physics\nqueue: pbatch\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.batch.bank.as_deref(), Some("physics"));
        assert_eq!(config.batch.queue.as_deref(), Some("pbatch"));
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "variant: flux-spectrum\n").unwrap();

        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_load_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("step.yaml");
        std::fs::write(
            &path,
            "name: sim\ndescription: run it\n\
             run:\n  nodes: 1\n  walltime: \"00:05:00\"\n  cmd: ./sim\n",
        )
        .unwrap();

        let step = load_step(&path).unwrap();
        assert_eq!(step.name, "sim");
        assert!(load_step(&dir.path().join("missing.yaml")).is_err());
    }
}
