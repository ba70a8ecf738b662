//! `JobPlanner`: turns one [`RunConfig`] into job scripts and drives them.
//!
//! Order of work in [`JobPlanner::prepare`]:
//! 1. validate the grid and read the binning table (no filesystem writes yet),
//! 2. lay out the output directory (stale outputs removed, fresh job dir, log header),
//! 3. partition the bins and write one script per group plus `manifest.json`.
//!
//! Any configuration or missing-input error therefore surfaces before a
//! single script exists.

use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use inj_core::{Error, Result};
use serde::Serialize;

use crate::config::{PlanSettings, RunConfig};
use crate::layout::{RunLayout, prepare_layout, sha256_file};
use crate::partition::{JobGroup, partition};
use crate::runner::{ExecutionMode, Launcher, RunReport, run_plan};
use crate::script::{job_name, write_job_script};
use crate::table::count_unique_bins;

/// File written into each job directory describing the generated jobs.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Scripts and paths produced by [`JobPlanner::prepare`].
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub axes: Vec<String>,
    pub bins: usize,
    pub groups: Vec<JobGroup>,
    /// One script per group, same order as `groups`.
    pub scripts: Vec<PathBuf>,
    pub layout: RunLayout,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    tool: &'static str,
    tool_version: &'static str,
    created: &'a str,
    config: &'a RunConfig,
    axes: &'a [String],
    bins: usize,
    table_sha256: &'a str,
    jobs: Vec<ManifestJob>,
}

#[derive(Debug, Serialize)]
struct ManifestJob {
    job_name: String,
    bin_index_start: usize,
    bin_index_end: usize,
    out_filename: String,
    script: PathBuf,
}

/// Plans and executes one run.
///
/// Holds its own copy of the run configuration with `~/` paths resolved
/// against `HOME`, so job scripts and local runs see the same arguments.
pub struct JobPlanner<'a> {
    config: RunConfig,
    settings: &'a PlanSettings,
}

impl<'a> JobPlanner<'a> {
    pub fn new(config: &RunConfig, settings: &'a PlanSettings) -> Self {
        let home = std::env::var_os("HOME");
        Self::with_home(config, settings, home.as_deref())
    }

    /// Like [`new`](Self::new) with an explicit home directory.
    pub fn with_home(
        config: &RunConfig,
        settings: &'a PlanSettings,
        home: Option<&OsStr>,
    ) -> Self {
        Self { config: config.with_home_expanded(home), settings }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// [`prepare_at`](Self::prepare_at) with the current local time.
    pub fn prepare(&self, console: &mut dyn Write) -> Result<PreparedRun> {
        self.prepare_at(Local::now().naive_local(), console)
    }

    /// Validate, lay out the output directory and write the job scripts.
    /// `now` names the job directory and the log header.
    pub fn prepare_at(&self, now: NaiveDateTime, console: &mut dyn Write) -> Result<PreparedRun> {
        let cfg = &self.config;
        cfg.validate(&self.settings.allowed_axes)?;
        let axes = cfg.axes(&self.settings.allowed_axes)?;

        if !cfg.file.exists() {
            return Err(Error::NotFound(cfg.file.clone()));
        }
        let unique = count_unique_bins(&cfg.table, &axes, self.settings.delimiter_byte()?)?;
        let bins = unique.len();
        writeln!(console, "Detected {bins} unique bins for grid {}.", axes.join(","))?;
        tracing::info!(
            run = %cfg.label(),
            bins,
            rows = unique.rows_read(),
            grid = %axes.join(","),
            "binning table read"
        );
        let groups = partition(bins, cfg.bins_per_job)?;
        let table_sha256 = sha256_file(&cfg.table)?;

        let layout = prepare_layout(cfg, bins, &table_sha256, now)?;
        if layout.removed_outputs > 0 {
            tracing::info!(removed = layout.removed_outputs, "removed stale outputs");
        }

        let mut scripts = Vec::with_capacity(groups.len());
        for group in &groups {
            let path = write_job_script(group, cfg, self.settings, &layout.job_dir)?;
            writeln!(console, "Created SLURM script: {}", path.display())?;
            scripts.push(path);
        }

        let manifest = Manifest {
            tool: "injplan",
            tool_version: inj_core::VERSION,
            created: &layout.timestamp,
            config: cfg,
            axes: &axes,
            bins,
            table_sha256: &table_sha256,
            jobs: groups
                .iter()
                .zip(&scripts)
                .map(|(g, s)| ManifestJob {
                    job_name: job_name(g, &cfg.energy),
                    bin_index_start: g.start,
                    bin_index_end: g.last(),
                    out_filename: g.out_filename(),
                    script: s.clone(),
                })
                .collect(),
        };
        let manifest_path = layout.job_dir.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
            .map_err(|e| Error::write(&manifest_path, e))?;

        writeln!(console, "\nSLURM job scripts located in: {}\n", layout.job_dir.display())?;
        tracing::info!(jobs = scripts.len(), job_dir = %layout.job_dir.display(), "job scripts written");

        Ok(PreparedRun { axes, bins, groups, scripts, layout })
    }

    /// Submit, run locally, or cancel a prepared run.
    pub fn execute(
        &self,
        mode: ExecutionMode,
        prepared: &PreparedRun,
        launcher: &mut dyn Launcher,
        console: &mut dyn Write,
    ) -> Result<RunReport> {
        run_plan(mode, prepared, &self.config, self.settings, launcher, console)
    }
}
