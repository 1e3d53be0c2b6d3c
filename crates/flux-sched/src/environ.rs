//! Environment shipped with submitted jobs.

use std::collections::BTreeMap;

/// Variables that describe the submitting host and must not follow the job.
const HOST_IDENTITY_VARS: [&str; 2] = ["HOSTNAME", "ENVIRONMENT"];

/// Forces the MPI runtime to start remote ranks through its RSH launcher,
/// which multi-node launches inside a Flux allocation depend on.
const RSH_LAUNCH_VAR: (&str, &str) = ("MPIRUN_RSH_LAUNCH", "1");

/// Build the environment for a job from an explicit set of variables.
///
/// Drops every variable starting with `prefix` (when non-empty) and the
/// host identity variables, then sets the RSH launch flag.
pub fn filter_environment<I, K, V>(vars: I, prefix: &str) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut env: BTreeMap<String, String> = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .filter(|(k, _)| prefix.is_empty() || !k.starts_with(prefix))
        .collect();

    for var in HOST_IDENTITY_VARS {
        env.remove(var);
    }

    env.insert(RSH_LAUNCH_VAR.0.to_string(), RSH_LAUNCH_VAR.1.to_string());
    env
}

/// Build the environment for a job from the current process environment.
///
/// Variables whose name or value is not valid UTF-8 are skipped.
pub fn process_environment(prefix: &str) -> BTreeMap<String, String> {
    let vars = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    filter_environment(vars, prefix)
}
