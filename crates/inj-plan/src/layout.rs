//! On-disk layout of a run: output directory, job directory, run log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use inj_core::{Error, Result};
use sha2::{Digest, Sha256};

use crate::config::RunConfig;

/// Name of the append-only log shared by every run into one output directory.
pub const LOG_FILE_NAME: &str = "injection_log.txt";

/// Subdirectory of the output directory holding per-run job directories.
pub const JOB_ROOT: &str = "slurm";

/// Format of run timestamps (job directory names and log headers).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Paths created for one run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunLayout {
    pub out_dir: PathBuf,
    pub job_dir: PathBuf,
    pub log_file: PathBuf,
    pub timestamp: String,
    /// Number of stale `*.yaml` outputs deleted from `out_dir`.
    pub removed_outputs: usize,
}

/// Pre-run side effects, in order: create `out_dir`, delete stale YAML
/// outputs, create a fresh job directory, append the run header to the log.
pub fn prepare_layout(
    config: &RunConfig,
    bins: usize,
    table_sha256: &str,
    now: NaiveDateTime,
) -> Result<RunLayout> {
    let out_dir = config.output_dir();
    if !out_dir.exists() {
        tracing::info!(out_dir = %out_dir.display(), "creating output directory");
    }
    std::fs::create_dir_all(&out_dir).map_err(|e| Error::write(&out_dir, e))?;

    let removed_outputs = clear_stale_outputs(&out_dir)?;

    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let job_dir = create_job_dir(&out_dir, &timestamp)?;

    let log_file = out_dir.join(LOG_FILE_NAME);
    append_run_header(&log_file, &timestamp, config, bins, table_sha256)?;

    Ok(RunLayout { out_dir, job_dir, log_file, timestamp, removed_outputs })
}

/// Delete `*.yaml` files directly inside `dir`. Returns how many were removed.
pub fn clear_stale_outputs(dir: &Path) -> Result<usize> {
    let mut entries: Vec<PathBuf> =
        std::fs::read_dir(dir)?.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();

    let mut removed = 0;
    for p in entries {
        let is_yaml = p.extension().and_then(|s| s.to_str()) == Some("yaml");
        if is_yaml && p.is_file() {
            std::fs::remove_file(&p).map_err(|e| Error::write(&p, e))?;
            tracing::debug!(path = %p.display(), "removed stale output");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Create `<out_dir>/slurm/<timestamp>`; a numeric suffix is added when a
/// directory with that name already exists.
pub fn create_job_dir(out_dir: &Path, timestamp: &str) -> Result<PathBuf> {
    let root = out_dir.join(JOB_ROOT);
    std::fs::create_dir_all(&root).map_err(|e| Error::write(&root, e))?;

    let mut candidate = root.join(timestamp);
    let mut n = 0;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = root.join(format!("{timestamp}_{n}"));
            }
            Err(e) => return Err(Error::write(&candidate, e)),
        }
    }
}

/// Append the run header block to the log file.
pub fn append_run_header(
    log_file: &Path,
    timestamp: &str,
    config: &RunConfig,
    bins: usize,
    table_sha256: &str,
) -> Result<()> {
    let mut text = format!("===== Injection Run at {timestamp} =====\n");
    for (key, value) in config.fields() {
        text.push_str(&format!("{key}: {value}\n"));
    }
    text.push_str(&format!("bins: {bins}\n"));
    text.push_str(&format!("table_sha256: {table_sha256}\n"));
    text.push_str(&format!("tool_version: {}\n", inj_core::VERSION));
    text.push_str("=====================================\n\n");

    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| Error::write(log_file, e))?;
    f.write_all(text.as_bytes()).map_err(|e| Error::write(log_file, e))?;
    Ok(())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut s = String::with_capacity(64);
    for b in out {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    Ok(sha256_hex(&std::fs::read(path)?))
}
