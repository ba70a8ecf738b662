//! Execution of a prepared run: scheduler submission or sequential local runs.
//!
//! Both modes are best-effort. A failing submission or a non-zero exit from
//! the injection binary is recorded in the [`RunReport`] and the remaining
//! groups still run. Nothing is retried.

use std::ffi::OsString;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;

use inj_core::{Error, Result};
use serde::Serialize;

use crate::config::{PlanSettings, RunConfig};
use crate::partition::JobGroup;
use crate::planner::PreparedRun;
use crate::script::{inject_args, job_name, shell_quote};

/// What to do with the generated job scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Hand every script to the scheduler's submit command.
    Submit,
    /// Run every group directly, one after another, in this shell.
    RunLocal,
    /// Do nothing.
    Cancel,
}

impl ExecutionMode {
    /// Map a numbered prompt answer (`1`, `2`, `3`) to a mode.
    pub fn from_choice(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(Self::Submit),
            "2" => Some(Self::RunLocal),
            "3" => Some(Self::Cancel),
            _ => None,
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(mode) = Self::from_choice(s) {
            return Ok(mode);
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "submit" => Ok(Self::Submit),
            "local" | "run-local" | "run_local" => Ok(Self::RunLocal),
            "cancel" => Ok(Self::Cancel),
            other => Err(Error::config(format!(
                "unknown execution mode {other:?} (expected submit, local or cancel)"
            ))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submit => write!(f, "submit"),
            Self::RunLocal => write!(f, "local"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// Ask for an execution mode until a valid choice is entered.
///
/// End of input counts as cancel.
pub fn prompt_execution_mode<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<ExecutionMode> {
    loop {
        writeln!(output, "Choose execution mode:")?;
        writeln!(output, "1: Submit batch jobs (outside eic-shell)")?;
        writeln!(output, "2: Run directly (inside eic-shell)")?;
        writeln!(output, "3: Cancel")?;
        write!(output, "> ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(ExecutionMode::Cancel);
        }
        match ExecutionMode::from_choice(&line) {
            Some(mode) => return Ok(mode),
            None => writeln!(output, "Invalid input.")?,
        }
    }
}

/// One external process to start.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables set in the child only; the parent environment is inherited otherwise.
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), env: Vec::new(), current_dir: None }
    }

    /// Parse a command template such as `sbatch --parsable` into program + leading args.
    pub fn from_template(template: &str) -> Result<Self> {
        let mut words = template.split_whitespace();
        let program =
            words.next().ok_or_else(|| Error::config("command template must not be empty"))?;
        Ok(Self::new(program).args(words))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: Vec<(OsString, OsString)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Shell-style rendering for logs.
    pub fn display(&self) -> String {
        let mut words = vec![shell_quote(&self.program.display().to_string()).into_owned()];
        words.extend(self.args.iter().map(|a| shell_quote(a).into_owned()));
        words.join(" ")
    }
}

/// How an external process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Starts external processes and streams their output.
pub trait Launcher {
    /// Run `invocation` to completion, calling `on_line` for every line of
    /// combined stdout/stderr as it arrives. `Err` means the process could
    /// not be started or its output could not be read.
    fn launch(
        &mut self,
        invocation: &Invocation,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ProcessExit>;
}

/// [`Launcher`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(
        &mut self,
        invocation: &Invocation,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ProcessExit> {
        let (reader, writer) = std::io::pipe()?;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(invocation.program.clone())
            } else {
                Error::Io(e)
            }
        })?;
        // The command still holds write ends of the pipe; EOF needs them closed.
        drop(cmd);

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let read = loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    on_line(line.trim_end_matches(['\n', '\r']));
                }
                Err(e) => break Err(e),
            }
        };
        let status = child.wait()?;
        read?;
        Ok(ProcessExit { code: status.code() })
    }
}

/// Result of one submission, local group run, or pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed { code: Option<i32> },
    LaunchFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<JobGroup>,
    #[serde(flatten)]
    pub status: StepStatus,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// Per-step outcomes of a best-effort execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<StepOutcome>,
}

impl RunReport {
    pub fn record(&mut self, label: String, group: Option<JobGroup>, result: Result<ProcessExit>) {
        let status = match result {
            Ok(exit) if exit.success() => StepStatus::Succeeded,
            Ok(exit) => StepStatus::Failed { code: exit.code },
            Err(e) => StepStatus::LaunchFailed { message: e.to_string() },
        };
        if status != StepStatus::Succeeded {
            tracing::warn!(step = %label, ?status, "step failed");
        }
        self.outcomes.push(StepOutcome { label, group, status });
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Carry out `mode` for a prepared run.
pub fn run_plan(
    mode: ExecutionMode,
    prepared: &PreparedRun,
    config: &RunConfig,
    settings: &PlanSettings,
    launcher: &mut dyn Launcher,
    console: &mut dyn Write,
) -> Result<RunReport> {
    tracing::info!(run = %config.label(), %mode, groups = prepared.groups.len(), "executing plan");
    match mode {
        ExecutionMode::Cancel => {
            writeln!(console, "Cancelled.")?;
            Ok(RunReport::default())
        }
        ExecutionMode::Submit => submit_all(prepared, settings, launcher, console),
        ExecutionMode::RunLocal => run_local(prepared, config, settings, launcher, console),
    }
}

fn submit_all(
    prepared: &PreparedRun,
    settings: &PlanSettings,
    launcher: &mut dyn Launcher,
    console: &mut dyn Write,
) -> Result<RunReport> {
    let template = Invocation::from_template(&settings.scheduler.submit_command)?;
    let env = settings.environment.child_env()?;

    let mut report = RunReport::default();
    for (group, script) in prepared.groups.iter().zip(&prepared.scripts) {
        let inv = template.clone().arg(script.display().to_string()).envs(env.clone());
        let mut sink = LineSink::new(console, None);
        let result = launcher.launch(&inv, &mut |line| sink.line(line));
        sink.finish()?;
        report.record(script.display().to_string(), Some(*group), result);
    }
    writeln!(console, "Submitted {} of {} jobs.", report.succeeded(), report.attempted())?;
    Ok(report)
}

fn run_local(
    prepared: &PreparedRun,
    config: &RunConfig,
    settings: &PlanSettings,
    launcher: &mut dyn Launcher,
    console: &mut dyn Write,
) -> Result<RunReport> {
    let log_path = &prepared.layout.log_file;
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| Error::write(log_path, e))?;
    let env = settings.environment.child_env()?;

    writeln!(console, "Running locally...")?;
    let mut report = RunReport::default();
    for group in &prepared.groups {
        let inv = Invocation::new(&settings.environment.inject_binary)
            .args(inject_args(config, group))
            .envs(env.clone());

        let banner = format!("Running: {}", inv.display());
        writeln!(console, "\n{banner}\n")?;
        writeln!(log, "{banner}")?;

        let mut sink = LineSink::new(console, Some(&mut log));
        let result = launcher.launch(&inv, &mut |line| sink.line(line));
        sink.finish()?;

        if let Ok(exit) = &result
            && !exit.success()
        {
            writeln!(log, "exit status: {:?}", exit.code)?;
        }
        if let Err(e) = &result {
            writeln!(log, "failed to start: {e}")?;
        }
        report.record(job_name(group, &config.energy), Some(*group), result);
    }

    writeln!(console, "All local injections completed.")?;
    writeln!(console, "{} of {} groups failed.", report.failed(), report.attempted())?;
    writeln!(log, "local run finished: {} attempted, {} failed", report.attempted(), report.failed())?;
    Ok(report)
}

/// Tees output lines to the console and, optionally, the run log.
///
/// Write errors are held until `finish` because the line callback cannot
/// return them.
pub(crate) struct LineSink<'a> {
    console: &'a mut dyn Write,
    log: Option<&'a mut std::fs::File>,
    error: Option<std::io::Error>,
}

impl<'a> LineSink<'a> {
    pub(crate) fn new(console: &'a mut dyn Write, log: Option<&'a mut std::fs::File>) -> Self {
        Self { console, log, error: None }
    }

    pub(crate) fn line(&mut self, line: &str) {
        if self.error.is_some() {
            return;
        }
        let mut res = writeln!(self.console, "{line}");
        if let (Ok(()), Some(log)) = (&res, self.log.as_mut()) {
            res = writeln!(log, "{line}");
        }
        if let Err(e) = res {
            self.error = Some(e);
        }
    }

    pub(crate) fn finish(self) -> Result<()> {
        match self.error {
            Some(e) => Err(Error::Io(e)),
            None => Ok(()),
        }
    }
}
