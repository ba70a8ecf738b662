//! `injplan plan` orchestration.

use anyhow::{Context, Result};
use inj_plan::{ExecutionMode, JobPlanner, PlanFile, RunReport, SystemLauncher};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Plan every selected run, then execute each with `mode` (or a prompt).
pub fn cmd_plan(
    config: &Path,
    run: Option<&str>,
    mode: Option<ExecutionMode>,
    report_path: Option<&PathBuf>,
) -> Result<()> {
    let plan = PlanFile::load(config)
        .with_context(|| format!("failed to load plan file {}", config.display()))?;
    let runs = plan.select(run)?;
    tracing::info!(path = %config.display(), runs = runs.len(), "plan file loaded");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut launcher = SystemLauncher;
    let mut reports: Vec<(String, ExecutionMode, RunReport)> = Vec::new();

    for cfg in runs {
        let planner = JobPlanner::new(cfg, &plan.settings);
        let prepared = planner
            .prepare(&mut stdout)
            .with_context(|| format!("failed to prepare run {}", cfg.label()))?;

        let chosen = match mode {
            Some(m) => m,
            None => inj_plan::prompt_execution_mode(&mut stdin.lock(), &mut stdout)?,
        };
        let report = planner.execute(chosen, &prepared, &mut launcher, &mut stdout)?;
        stdout.flush()?;
        reports.push((cfg.label(), chosen, report));
    }

    if let Some(path) = report_path {
        let value = serde_json::json!({
            "tool": "injplan",
            "tool_version": inj_core::VERSION,
            "runs": reports
                .iter()
                .map(|(label, mode, report)| serde_json::json!({
                    "run": label,
                    "mode": mode,
                    "attempted": report.attempted(),
                    "failed": report.failed(),
                    "outcomes": report.outcomes,
                }))
                .collect::<Vec<_>>(),
        });
        crate::write_json(path, &value)?;
    }

    let attempted: usize = reports.iter().map(|(_, _, r)| r.attempted()).sum();
    let failed: usize = reports.iter().map(|(_, _, r)| r.failed()).sum();
    if failed > 0 {
        anyhow::bail!("{failed} of {attempted} steps failed");
    }
    Ok(())
}
