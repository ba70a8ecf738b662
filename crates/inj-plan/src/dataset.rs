//! Dataset generation through the external pipeline runner.
//!
//! The pipeline checkout (e.g. `submodules/epic-analysis`) ships a runner that
//! takes one runcard per invocation. Runcards are run one after another from
//! inside that checkout.

use std::io::Write;
use std::path::PathBuf;

use inj_core::{Error, Result};

use crate::config::EnvironmentSettings;
use crate::runner::{Invocation, LineSink, Launcher, RunReport};

/// Default pipeline runner command, relative to the pipeline checkout.
pub const DEFAULT_RUNNER: &str = "ruby hpc/run-local-slurm-pipeline.rb";

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPlan {
    /// Directory the runner is started in.
    pub workdir: PathBuf,
    /// Runner command; `--runcard <path>` is appended per runcard.
    pub runner: String,
    /// Runcard paths, relative to `workdir` unless absolute.
    pub runcards: Vec<PathBuf>,
    /// Only `library_paths` applies; the runner is not the injection binary.
    pub environment: EnvironmentSettings,
}

impl DatasetPlan {
    pub fn new(workdir: impl Into<PathBuf>, runcards: Vec<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            runner: DEFAULT_RUNNER.to_string(),
            runcards,
            environment: EnvironmentSettings::default(),
        }
    }

    /// One invocation per runcard, in order.
    pub fn invocations(&self) -> Result<Vec<Invocation>> {
        let template = Invocation::from_template(&self.runner)?;
        let env = self.environment.child_env()?;
        Ok(self
            .runcards
            .iter()
            .map(|rc| {
                template
                    .clone()
                    .arg("--runcard")
                    .arg(rc.display().to_string())
                    .envs(env.clone())
                    .current_dir(&self.workdir)
            })
            .collect())
    }
}

/// Run every runcard through the pipeline runner, continuing past failures.
pub fn run_datasets(
    plan: &DatasetPlan,
    launcher: &mut dyn Launcher,
    console: &mut dyn Write,
) -> Result<RunReport> {
    if !plan.workdir.is_dir() {
        return Err(Error::NotFound(plan.workdir.clone()));
    }
    if plan.runcards.is_empty() {
        return Err(Error::config("no runcards given"));
    }

    let mut report = RunReport::default();
    for (inv, runcard) in plan.invocations()?.iter().zip(&plan.runcards) {
        writeln!(console, "\nRunning: {} (in {})\n", inv.display(), plan.workdir.display())?;
        let mut sink = LineSink::new(console, None);
        let result = launcher.launch(inv, &mut |line| sink.line(line));
        sink.finish()?;
        report.record(runcard.display().to_string(), None, result);
    }
    tracing::info!(
        runcards = report.attempted(),
        failed = report.failed(),
        "dataset pipeline finished"
    );
    writeln!(console, "{} of {} runcards failed.", report.failed(), report.attempted())?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::FakeLauncher;
    use inj_core::ErrorKind;
    use std::path::Path;

    #[test]
    fn invocations_append_runcards() {
        let plan = DatasetPlan::new(
            "submodules/epic-analysis",
            vec![
                PathBuf::from("../../analysis/yorgo/runcards/eHe3_10x166_pipluspiminus.yaml"),
                PathBuf::from("../../analysis/yorgo/runcards/ep_10x100_pipluspiminus.yaml"),
            ],
        );
        let invs = plan.invocations().unwrap();
        assert_eq!(invs.len(), 2);
        assert_eq!(invs[0].program, PathBuf::from("ruby"));
        assert_eq!(
            invs[1].args,
            vec![
                "hpc/run-local-slurm-pipeline.rb",
                "--runcard",
                "../../analysis/yorgo/runcards/ep_10x100_pipluspiminus.yaml"
            ]
        );
        assert_eq!(invs[0].current_dir.as_deref(), Some(Path::new("submodules/epic-analysis")));
    }

    #[test]
    fn runs_every_runcard() {
        let dir = std::env::temp_dir();
        let plan = DatasetPlan::new(&dir, vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
        let mut launcher = FakeLauncher { exits: vec![Some(1)], ..Default::default() };
        let mut console = Vec::new();
        let report = run_datasets(&plan, &mut launcher, &mut console).unwrap();
        assert_eq!(launcher.calls.len(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[1].label, "b.yaml");
        let text = String::from_utf8(console).unwrap();
        assert!(text.contains("call 1"));
        assert!(text.contains("1 of 2 runcards failed."));
    }

    #[test]
    fn library_paths_reach_every_runcard() {
        let mut plan =
            DatasetPlan::new("pipeline", vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
        assert!(plan.invocations().unwrap()[0].env.is_empty());

        plan.environment.library_paths = vec![PathBuf::from("/opt/root/lib")];
        let invs = plan.invocations().unwrap();
        for inv in &invs {
            let (key, value) = &inv.env[0];
            assert_eq!(key, crate::config::LIBRARY_PATH_VAR);
            assert!(value.to_string_lossy().starts_with("/opt/root/lib"));
        }
    }

    #[test]
    fn missing_workdir() {
        let plan = DatasetPlan::new("/nonexistent/epic-analysis", vec![PathBuf::from("a.yaml")]);
        let err = run_datasets(&plan, &mut FakeLauncher::default(), &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
