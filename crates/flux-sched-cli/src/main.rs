//! Flux Scheduler Command-Line Interface
//!
//! Drives the Flux adapter by hand or from shell-based workflow engines:
//!
//! ```text
//! flux-sched script --step step.yaml --workspace ./ws
//! flux-sched submit --step step.yaml --script ./ws/sim.flux.sh
//! flux-sched status 1001 1002
//! flux-sched cancel 1001
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use flux_sched::JobId;

mod commands;

use commands::{cancel, script, status, submit};

/// Flux batch-scheduler adapter for workflow steps
#[derive(Parser)]
#[command(name = "flux-sched")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Adapter configuration file (YAML)
    #[arg(short, long, global = true, env = "FLUX_SCHED_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the job scripts for a step
    Script {
        /// Step description (YAML)
        #[arg(short, long)]
        step: PathBuf,

        /// Directory the scripts are written to
        #[arg(short, long)]
        workspace: PathBuf,
    },

    /// Submit a step's script to Flux
    Submit {
        /// Step description (YAML)
        #[arg(short, long)]
        step: PathBuf,

        /// Script to run
        #[arg(long)]
        script: PathBuf,

        /// Working directory of the job (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },

    /// Query the state of jobs
    Status {
        /// Job identifiers
        #[arg(required = true)]
        jobs: Vec<JobId>,

        /// Print states as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel jobs, escalating to kill when needed
    Cancel {
        /// Job identifiers
        #[arg(required = true)]
        jobs: Vec<JobId>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Script { step, workspace } => script::execute(config, &step, &workspace).await,

        Commands::Submit { step, script, cwd } => {
            submit::execute(config, &step, &script, cwd.as_deref()).await
        }

        Commands::Status { jobs, json } => status::execute(config, &jobs, json).await,

        Commands::Cancel { jobs } => cancel::execute(config, &jobs).await,
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
