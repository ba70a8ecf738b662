//! Injection command lines and SLURM job scripts.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use inj_core::{Error, Result};

use crate::config::{PlanSettings, RunConfig, SchedulerSettings};
use crate::partition::JobGroup;

/// `inj_<first>_to_<last>_<energy>`
pub fn job_name(group: &JobGroup, energy: &str) -> String {
    format!("inj_{}_to_{}_{}", group.start, group.last(), energy)
}

/// File name of the job script for `group`.
pub fn script_filename(group: &JobGroup, energy: &str) -> String {
    format!("slurm_{}.sh", job_name(group, energy))
}

/// Arguments passed to the injection binary for one job group.
///
/// Job scripts and local runs both use this list, so the two modes always
/// agree on what the binary receives.
pub fn inject_args(config: &RunConfig, group: &JobGroup) -> Vec<String> {
    let out_dir = config.output_dir();
    let pairs: [(&str, String); 16] = [
        ("--file", config.file.display().to_string()),
        ("--tree", config.tree.clone()),
        ("--energy", config.energy.clone()),
        ("--table", config.table.display().to_string()),
        ("--outDir", dir_arg(&out_dir)),
        ("--maxEntries", config.max_entries.to_string()),
        ("--channel", config.channel.clone()),
        ("--eic_timeline", config.eic_timeline.clone()),
        ("--target", config.target.clone()),
        ("--grid", config.grid.clone()),
        ("--n_injections", config.n_injections.to_string()),
        ("--extract_with_true", config.extract_with_true.to_string()),
        ("--targetPolarization", config.target_polarization.to_string()),
        ("--bin_index_start", group.start.to_string()),
        ("--bin_index_end", group.last().to_string()),
        ("--outFilename", group.out_filename()),
    ];
    pairs.into_iter().flat_map(|(flag, value)| [flag.to_string(), value]).collect()
}

/// Directory argument with a trailing separator; the injection binary
/// appends `--outFilename` to it directly.
fn dir_arg(dir: &Path) -> String {
    let mut s = dir.display().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

/// Quote `s` for a POSIX shell if it contains anything outside a safe set.
pub fn shell_quote(s: &str) -> Cow<'_, str> {
    let safe = !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || "_-./,:=+%@".contains(c));
    if safe {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(format!("'{}'", s.replace('\'', r"'\''")))
    }
}

fn directives(scheduler: &SchedulerSettings, name: &str, job_dir: &Path) -> Vec<String> {
    let job_dir = job_dir.display();
    let mut lines = vec![
        format!("--job-name={name}"),
        format!("--output={job_dir}/%x_%j.out"),
        format!("--error={job_dir}/%x_%j.err"),
        format!("--account={}", scheduler.account),
        format!("--partition={}", scheduler.partition),
        format!("--cpus-per-task={}", scheduler.cpus_per_task),
        format!("--mem-per-cpu={}", scheduler.mem_per_cpu),
        format!("--time={}", scheduler.time),
    ];
    lines.extend(scheduler.extra_directives.iter().cloned());
    lines
}

/// Full text of the job script for `group`.
pub fn render_job_script(
    group: &JobGroup,
    config: &RunConfig,
    settings: &PlanSettings,
    job_dir: &Path,
) -> String {
    let name = job_name(group, &config.energy);
    let mut out = String::from("#!/bin/bash\n");
    for d in directives(&settings.scheduler, &name, job_dir) {
        out.push_str("#SBATCH ");
        out.push_str(&d);
        out.push('\n');
    }
    out.push('\n');

    let mut words: Vec<String> = Vec::new();
    if !settings.scheduler.launcher.trim().is_empty() {
        words.push(settings.scheduler.launcher.trim().to_string());
    }
    words.push(shell_quote(&settings.environment.inject_binary.display().to_string()).into_owned());
    words.extend(inject_args(config, group).iter().map(|a| shell_quote(a).into_owned()));
    out.push_str(&words.join(" "));
    out.push('\n');
    out
}

/// Write the job script for `group` into `job_dir`, replacing any existing file.
pub fn write_job_script(
    group: &JobGroup,
    config: &RunConfig,
    settings: &PlanSettings,
    job_dir: &Path,
) -> Result<PathBuf> {
    let path = job_dir.join(script_filename(group, &config.energy));
    let text = render_job_script(group, config, settings, job_dir);
    std::fs::write(&path, text).map_err(|e| Error::write(&path, e))?;
    tracing::debug!(script = %path.display(), group = %group, "job script written");
    Ok(path)
}
