//! Flux job script templates.
//!
//! A scheduled script is a header block followed by a blank line and the
//! command body. Unscheduled steps run inline under the current allocation
//! and only get the interpreter line.

use crate::config::{FluxConfig, FluxVariant};
use crate::error::SchedResult;
use crate::step::StepDescription;

/// File extension of generated scripts.
pub const EXTENSION: &str = "flux.sh";

/// Token in step commands replaced by the launcher invocation.
pub const LAUNCHER_TOKEN: &str = "$(LAUNCHER)";

/// Port appended to every host in the Spectrum host file.
const HOSTFILE_PORT: u16 = 44;

/// Stack size limit (KiB) raised for Spectrum MPI ranks.
const STACK_LIMIT_KB: u32 = 10240;

/// Command text of a step after scheduling decisions are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerCommand {
    pub to_be_scheduled: bool,
    pub cmd: String,
    pub restart: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderField {
    Nodes,
    Walltime,
    JobName,
    Comment,
    Queue,
    Bank,
    Reservation,
}

impl HeaderField {
    fn key(&self) -> &'static str {
        match self {
            HeaderField::Nodes => "nodes",
            HeaderField::Walltime => "walltime",
            HeaderField::JobName => "job-name",
            HeaderField::Comment => "comment",
            HeaderField::Queue => "queue",
            HeaderField::Bank => "bank",
            HeaderField::Reservation => "reservation",
        }
    }

    fn format(&self, variant: FluxVariant, value: &str) -> String {
        match variant {
            FluxVariant::Flux => format!("#INFO ({}) {}", self.key(), value),
            FluxVariant::Spectrum => match self {
                HeaderField::Nodes => format!("#SBATCH -N {value}"),
                HeaderField::Walltime => format!("#SBATCH -t {value}"),
                HeaderField::JobName => format!("#SBATCH -J {value}"),
                HeaderField::Comment => {
                    let quoted = value.replace('\\', "\\\\").replace('"', "\\\"");
                    format!("#SBATCH --comment=\"{quoted}\"")
                }
                HeaderField::Queue => format!("#SBATCH -p {value}"),
                HeaderField::Bank => format!("#SBATCH -A {value}"),
                HeaderField::Reservation => format!("#SBATCH --reservation={value}"),
            },
        }
    }
}

/// Node count used for the header and the launcher.
fn step_nodes(step: &StepDescription, config: &FluxConfig) -> u32 {
    match step.run.nodes {
        Some(nodes) if nodes > 0 => nodes,
        _ => config.batch.nodes,
    }
}

/// Process count used for the launcher.
fn step_procs(step: &StepDescription, config: &FluxConfig) -> u32 {
    match step.run.procs {
        Some(procs) if procs > 0 => procs,
        _ => step_nodes(step, config),
    }
}

/// Generate the header block for a scheduled step.
///
/// Fails if the step's walltime is missing or malformed.
pub fn header(step: &StepDescription, config: &FluxConfig) -> SchedResult<String> {
    let walltime = step.walltime_seconds()?;
    let nodes = step_nodes(step, config);
    let batch = &config.batch;

    let mut fields = vec![
        (HeaderField::Nodes, nodes.to_string()),
        (HeaderField::Walltime, walltime.to_string()),
        (HeaderField::JobName, step.name.replace(' ', "_")),
        (HeaderField::Comment, flatten_description(&step.description)),
    ];
    if let Some(ref queue) = batch.queue {
        fields.push((HeaderField::Queue, queue.clone()));
    }
    // A reservation already pins the allocation, so the bank is left out.
    if let Some(ref bank) = batch.bank {
        if batch.reservation.is_none() {
            fields.push((HeaderField::Bank, bank.clone()));
        }
    }
    if let Some(ref reservation) = batch.reservation {
        fields.push((HeaderField::Reservation, reservation.clone()));
    }

    let mut lines = vec![config.shebang()];
    lines.extend(
        fields
            .iter()
            .map(|(field, value)| field.format(config.variant, value)),
    );

    if config.variant.discovers_hosts() {
        lines.extend(host_discovery(nodes));
    }

    Ok(lines.join("\n"))
}

/// Lines writing the allocation's hosts, each with the launcher port, to
/// `$HOSTF`.
fn host_discovery(nodes: u32) -> Vec<String> {
    let discover = if nodes > 1 {
        "instance-nodes > $HOSTF_SINGLE"
    } else {
        "echo localhost > $HOSTF_SINGLE"
    };
    vec![
        "HOSTF_SINGLE=$(mktemp /tmp/hostls-XXXXX)".to_string(),
        "HOSTF=$(mktemp /tmp/hostl-XXXXX)".to_string(),
        discover.to_string(),
        format!("sed -e \"s/$/:{HOSTFILE_PORT}/\" $HOSTF_SINGLE > $HOSTF"),
        format!("ulimit -s {STACK_LIMIT_KB}"),
    ]
}

fn flatten_description(description: &str) -> String {
    description
        .replace("\r\n", " ")
        .replace('\n', " ")
        .trim()
        .to_string()
}

/// Generate the launcher invocation for `procs` processes on `nodes` nodes.
pub fn parallelize_command(config: &FluxConfig, procs: u32, nodes: u32) -> String {
    let mut args: Vec<String> = Vec::new();

    match config.variant {
        FluxVariant::Flux => {
            args.push(config.flux_program.display().to_string());
            args.extend(["wreckrun".to_string(), "-n".to_string(), procs.to_string()]);
            args.extend(["-N".to_string(), nodes.to_string()]);
            if !config.args.is_empty() {
                args.push("-o".to_string());
                args.push(config.args.join(","));
            }
        }
        FluxVariant::Spectrum => {
            args.push("env".to_string());
            for var in ["FLUX_JOB_ID", "PMI_FD", "PMI_RANK", "PMI_SIZE"] {
                args.push("-u".to_string());
                args.push(var.to_string());
            }
            args.push(
                config
                    .mpi
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "mpirun".to_string()),
            );
            args.extend(config.args.iter().cloned());
            args.extend(["-hostfile".to_string(), "$HOSTF".to_string()]);
            args.extend(["-n".to_string(), procs.to_string()]);
        }
    }

    args.join(" ")
}

/// Replace every launcher token in `cmd`.
///
/// A token may carry an override such as `$(LAUNCHER)[2n, 8p]`; either part
/// may be omitted. Without an override, `nodes` and `procs` are used.
pub fn substitute_launcher(cmd: &str, config: &FluxConfig, nodes: u32, procs: u32) -> String {
    let mut out = String::with_capacity(cmd.len());
    let mut rest = cmd;

    while let Some(pos) = rest.find(LAUNCHER_TOKEN) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + LAUNCHER_TOKEN.len()..];

        let (n, p, consumed) = parse_launcher_override(rest).unwrap_or((None, None, 0));
        rest = &rest[consumed..];
        out.push_str(&parallelize_command(
            config,
            p.unwrap_or(procs),
            n.unwrap_or(nodes),
        ));
    }

    out.push_str(rest);
    out
}

/// Parse `[<N>n, <P>p]` at the start of `s`, returning the overrides and
/// the number of bytes consumed.
fn parse_launcher_override(s: &str) -> Option<(Option<u32>, Option<u32>, usize)> {
    let close = s.strip_prefix('[')?.find(']')?;
    let inner = &s[1..1 + close];

    let mut nodes = None;
    let mut procs = None;
    for part in inner.split(',') {
        let part = part.trim();
        if let Some(n) = part.strip_suffix('n') {
            if nodes.replace(n.trim().parse().ok()?).is_some() {
                return None;
            }
        } else if let Some(p) = part.strip_suffix('p') {
            if procs.replace(p.trim().parse().ok()?).is_some() {
                return None;
            }
        } else {
            return None;
        }
    }

    Some((nodes, procs, close + 2))
}

/// Decide whether the step is scheduled and expand its commands.
pub fn scheduler_command(step: &StepDescription, config: &FluxConfig) -> SchedulerCommand {
    let restart = step.run.restart.as_deref().filter(|r| !r.trim().is_empty());

    if !step.requests_resources() {
        return SchedulerCommand {
            to_be_scheduled: false,
            cmd: step.run.cmd.clone(),
            restart: restart.map(str::to_string),
        };
    }

    let nodes = step_nodes(step, config);
    let procs = step_procs(step, config);
    SchedulerCommand {
        to_be_scheduled: true,
        cmd: substitute_launcher(&step.run.cmd, config, nodes, procs),
        restart: restart.map(|r| substitute_launcher(r, config, nodes, procs)),
    }
}

/// Render a full script: header (or bare interpreter line), blank line,
/// command body.
pub fn render(
    step: &StepDescription,
    config: &FluxConfig,
    body: &str,
    scheduled: bool,
) -> SchedResult<String> {
    let preamble = if scheduled {
        header(step, config)?
    } else {
        config.shebang()
    };
    Ok(format!("{preamble}\n\n{body}\n"))
}

/// File name of the primary script of a step.
pub fn script_name(step: &StepDescription) -> String {
    format!("{}.{}", step.name, EXTENSION)
}

/// File name of the restart script of a step.
pub fn restart_script_name(step: &StepDescription) -> String {
    format!("{}.restart.{}", step.name, EXTENSION)
}
