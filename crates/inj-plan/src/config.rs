//! Run configuration and plan files.
//!
//! A plan file holds the settings shared by every run (scheduler directives,
//! injection binary, subprocess environment) and a list of [`RunConfig`]s.
//! YAML by default; `.json` files are read as JSON.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use inj_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::grid::{DEFAULT_AXES, validate_grid};

/// Parameters of one injection study.
///
/// Constructed once (builder or plan file), validated, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Optional label used to pick a run out of a plan file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Root under which `<channel>/<energy>/<timeline>/<target>/<grid>/` is created.
    pub main_outdir: PathBuf,
    /// Analysis ROOT file fed to the injection binary.
    pub file: PathBuf,
    pub tree: String,
    pub energy: String,
    /// Binning table (CSV with `{axis}_min`/`{axis}_max` columns).
    pub table: PathBuf,
    #[serde(alias = "maxEntries")]
    pub max_entries: u64,
    pub channel: String,
    pub eic_timeline: String,
    pub target: String,
    /// Comma-separated grid axes, e.g. `X` or `X,Q,Z,PhPerp`.
    pub grid: String,
    pub n_injections: u64,
    pub extract_with_true: bool,
    #[serde(alias = "targetPolarization")]
    pub target_polarization: f64,
    #[serde(alias = "bins_per_slurm_job")]
    pub bins_per_job: usize,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// `<main_outdir>/<channel>/<energy>/<eic_timeline>/<target>/<grid>`
    pub fn output_dir(&self) -> PathBuf {
        self.main_outdir
            .join(&self.channel)
            .join(&self.energy)
            .join(&self.eic_timeline)
            .join(&self.target)
            .join(&self.grid)
    }

    /// Copy with a leading `~/` in `main_outdir`, `file` and `table` resolved
    /// against `home`. Without a home directory the paths are kept as written.
    pub fn with_home_expanded(&self, home: Option<&OsStr>) -> RunConfig {
        RunConfig {
            main_outdir: expand_home(&self.main_outdir, home),
            file: expand_home(&self.file, home),
            table: expand_home(&self.table, home),
            ..self.clone()
        }
    }

    /// Validated grid axes, in configured order.
    pub fn axes<S: AsRef<str>>(&self, allowed: &[S]) -> Result<Vec<String>> {
        validate_grid(&self.grid, allowed)
    }

    /// Label for log lines: the run name, or the output directory.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.output_dir().display().to_string(),
        }
    }

    pub fn validate<S: AsRef<str>>(&self, allowed: &[S]) -> Result<()> {
        let labels = [
            ("tree", &self.tree),
            ("energy", &self.energy),
            ("channel", &self.channel),
            ("eic_timeline", &self.eic_timeline),
            ("target", &self.target),
        ];
        for (key, value) in labels {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{key} must not be empty")));
            }
        }
        // These become output path components.
        for (key, value) in
            labels.iter().skip(1).copied().chain([("grid", &self.grid)])
        {
            if value.contains('/') || value == ".." {
                return Err(Error::config(format!(
                    "{key} must be a single path component, got {value:?}"
                )));
            }
        }
        if self.main_outdir.as_os_str().is_empty() {
            return Err(Error::config("main_outdir must not be empty"));
        }
        if self.file.as_os_str().is_empty() {
            return Err(Error::config("file must not be empty"));
        }
        if self.table.as_os_str().is_empty() {
            return Err(Error::config("table must not be empty"));
        }
        if self.bins_per_job == 0 {
            return Err(Error::config("bins_per_job must be positive"));
        }
        if !self.target_polarization.is_finite() {
            return Err(Error::config("target_polarization must be finite"));
        }
        self.axes(allowed)?;
        Ok(())
    }

    /// Every field as `(key, value)`, in the order written to the run log.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::with_capacity(15);
        if let Some(name) = &self.name {
            out.push(("name", name.clone()));
        }
        out.extend([
            ("main_outdir", self.main_outdir.display().to_string()),
            ("file", self.file.display().to_string()),
            ("tree", self.tree.clone()),
            ("energy", self.energy.clone()),
            ("table", self.table.display().to_string()),
            ("maxEntries", self.max_entries.to_string()),
            ("channel", self.channel.clone()),
            ("eic_timeline", self.eic_timeline.clone()),
            ("target", self.target.clone()),
            ("grid", self.grid.clone()),
            ("n_injections", self.n_injections.to_string()),
            ("extract_with_true", self.extract_with_true.to_string()),
            ("targetPolarization", self.target_polarization.to_string()),
            ("bins_per_job", self.bins_per_job.to_string()),
        ]);
        out
    }
}

/// Builder for [`RunConfig`]; `build` runs the same validation as plan files.
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    name: Option<String>,
    main_outdir: Option<PathBuf>,
    file: Option<PathBuf>,
    tree: String,
    energy: Option<String>,
    table: Option<PathBuf>,
    max_entries: u64,
    channel: Option<String>,
    eic_timeline: Option<String>,
    target: Option<String>,
    grid: String,
    n_injections: u64,
    extract_with_true: bool,
    target_polarization: f64,
    bins_per_job: usize,
    allowed_axes: Vec<String>,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            name: None,
            main_outdir: None,
            file: None,
            tree: "tree".to_string(),
            energy: None,
            table: None,
            max_entries: 10_000,
            channel: None,
            eic_timeline: None,
            target: None,
            grid: "X".to_string(),
            n_injections: 10,
            extract_with_true: false,
            target_polarization: 0.7,
            bins_per_job: 1,
            allowed_axes: DEFAULT_AXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RunConfigBuilder {
    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.name = Some(v.into());
        self
    }
    pub fn main_outdir(mut self, v: impl Into<PathBuf>) -> Self {
        self.main_outdir = Some(v.into());
        self
    }
    pub fn file(mut self, v: impl Into<PathBuf>) -> Self {
        self.file = Some(v.into());
        self
    }
    pub fn tree(mut self, v: impl Into<String>) -> Self {
        self.tree = v.into();
        self
    }
    pub fn energy(mut self, v: impl Into<String>) -> Self {
        self.energy = Some(v.into());
        self
    }
    pub fn table(mut self, v: impl Into<PathBuf>) -> Self {
        self.table = Some(v.into());
        self
    }
    pub fn max_entries(mut self, v: u64) -> Self {
        self.max_entries = v;
        self
    }
    pub fn channel(mut self, v: impl Into<String>) -> Self {
        self.channel = Some(v.into());
        self
    }
    pub fn eic_timeline(mut self, v: impl Into<String>) -> Self {
        self.eic_timeline = Some(v.into());
        self
    }
    pub fn target(mut self, v: impl Into<String>) -> Self {
        self.target = Some(v.into());
        self
    }
    pub fn grid(mut self, v: impl Into<String>) -> Self {
        self.grid = v.into();
        self
    }
    pub fn n_injections(mut self, v: u64) -> Self {
        self.n_injections = v;
        self
    }
    pub fn extract_with_true(mut self, v: bool) -> Self {
        self.extract_with_true = v;
        self
    }
    pub fn target_polarization(mut self, v: f64) -> Self {
        self.target_polarization = v;
        self
    }
    pub fn bins_per_job(mut self, v: usize) -> Self {
        self.bins_per_job = v;
        self
    }
    /// Replace the allowed grid axes used by `build` (default: `X, Q, Z, PhPerp`).
    pub fn allowed_axes<I, S>(mut self, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_axes = axes.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<RunConfig> {
        fn required<T>(v: Option<T>, key: &str) -> Result<T> {
            v.ok_or_else(|| Error::config(format!("{key} is required")))
        }
        let cfg = RunConfig {
            name: self.name,
            main_outdir: required(self.main_outdir, "main_outdir")?,
            file: required(self.file, "file")?,
            tree: self.tree,
            energy: required(self.energy, "energy")?,
            table: required(self.table, "table")?,
            max_entries: self.max_entries,
            channel: required(self.channel, "channel")?,
            eic_timeline: required(self.eic_timeline, "eic_timeline")?,
            target: required(self.target, "target")?,
            grid: self.grid,
            n_injections: self.n_injections,
            extract_with_true: self.extract_with_true,
            target_polarization: self.target_polarization,
            bins_per_job: self.bins_per_job,
        };
        cfg.validate(&self.allowed_axes)?;
        Ok(cfg)
    }
}

/// SLURM directives and launch commands. Passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub account: String,
    pub partition: String,
    pub cpus_per_task: u32,
    pub mem_per_cpu: String,
    pub time: String,
    /// Prefix of the invocation line inside job scripts.
    pub launcher: String,
    /// Command that receives a script path in submit mode.
    pub submit_command: String,
    /// Additional `#SBATCH` lines, without the `#SBATCH ` prefix.
    pub extra_directives: Vec<String>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            account: "eic".to_string(),
            partition: "production".to_string(),
            cpus_per_task: 2,
            mem_per_cpu: "4G".to_string(),
            time: "24:00:00".to_string(),
            launcher: "srun".to_string(),
            submit_command: "sbatch".to_string(),
            extra_directives: Vec::new(),
        }
    }
}

/// How the injection binary is located and what environment it runs with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub inject_binary: PathBuf,
    /// Prepended to `LD_LIBRARY_PATH` of every child process. A leading `~/`
    /// is resolved against `HOME`.
    pub library_paths: Vec<PathBuf>,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            inject_binary: PathBuf::from("./submodules/tmd-eic-ana/bin/inject"),
            library_paths: Vec::new(),
        }
    }
}

impl EnvironmentSettings {
    /// Child `LD_LIBRARY_PATH`: configured paths first, then `existing`.
    ///
    /// Returns `None` when no library paths are configured, leaving the
    /// inherited value untouched.
    pub fn library_path_value(
        &self,
        home: Option<&OsStr>,
        existing: Option<&OsStr>,
    ) -> Result<Option<OsString>> {
        if self.library_paths.is_empty() {
            return Ok(None);
        }
        let mut parts: Vec<PathBuf> =
            self.library_paths.iter().map(|p| expand_home(p, home)).collect();
        if let Some(existing) = existing
            && !existing.is_empty()
        {
            parts.extend(std::env::split_paths(existing));
        }
        std::env::join_paths(parts)
            .map(Some)
            .map_err(|e| Error::config(format!("invalid library path: {e}")))
    }

    /// Environment overlay for child processes, read from the current process
    /// environment without modifying it.
    pub fn child_env(&self) -> Result<Vec<(OsString, OsString)>> {
        let home = std::env::var_os("HOME");
        let existing = std::env::var_os(LIBRARY_PATH_VAR);
        Ok(self
            .library_path_value(home.as_deref(), existing.as_deref())?
            .map(|v| vec![(OsString::from(LIBRARY_PATH_VAR), v)])
            .unwrap_or_default())
    }
}

pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

fn expand_home(path: &Path, home: Option<&OsStr>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => Path::new(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Settings shared by all runs of a plan file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    pub scheduler: SchedulerSettings,
    pub environment: EnvironmentSettings,
    pub allowed_axes: Vec<String>,
    pub table_delimiter: char,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            environment: EnvironmentSettings::default(),
            allowed_axes: DEFAULT_AXES.iter().map(|s| s.to_string()).collect(),
            table_delimiter: ',',
        }
    }
}

impl PlanSettings {
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.table_delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                Error::config(format!(
                    "table_delimiter must be a single ASCII character, got {:?}",
                    self.table_delimiter
                ))
            })
    }
}

/// A plan file: shared settings plus one or more runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(flatten)]
    pub settings: PlanSettings,
    pub runs: Vec<RunConfig>,
}

impl PlanFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
        let plan: PlanFile = if ext == "json" {
            serde_json::from_slice(&bytes)?
        } else {
            serde_yaml_ng::from_slice(&bytes)?
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runs.is_empty() {
            return Err(Error::config("plan file defines no runs"));
        }
        self.settings.delimiter_byte()?;
        if self.settings.allowed_axes.is_empty() {
            return Err(Error::config("allowed_axes must not be empty"));
        }
        for (i, run) in self.runs.iter().enumerate() {
            run.validate(&self.settings.allowed_axes).map_err(|e| match e {
                Error::Config(msg) => Error::config(format!("runs[{i}]: {msg}")),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Runs to execute: all of them, or the one whose `name` matches.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&RunConfig>> {
        match name {
            None => Ok(self.runs.iter().collect()),
            Some(name) => {
                let picked: Vec<&RunConfig> =
                    self.runs.iter().filter(|r| r.name.as_deref() == Some(name)).collect();
                if picked.is_empty() {
                    let known: Vec<&str> =
                        self.runs.iter().filter_map(|r| r.name.as_deref()).collect();
                    return Err(Error::config(format!(
                        "no run named {name:?} (known: {})",
                        known.join(", ")
                    )));
                }
                Ok(picked)
            }
        }
    }
}
