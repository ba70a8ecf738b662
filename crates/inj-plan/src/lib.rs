//! # inj-plan
//!
//! Planning and launching of binned injection studies on a SLURM cluster.
//!
//! A run reads a binning table, counts the unique bins over the requested
//! grid axes, slices `[0, N)` into job groups and writes one batch script per
//! group. The scripts are then submitted, run locally one by one, or left
//! alone. The physics happens in the external `inject` binary; this crate
//! only builds its command lines and inputs.
//!
//! ```no_run
//! use inj_plan::{ExecutionMode, JobPlanner, PlanFile, SystemLauncher};
//!
//! # fn main() -> inj_core::Result<()> {
//! let plan = PlanFile::load("runs.yaml".as_ref())?;
//! for run in plan.select(None)? {
//!     let planner = JobPlanner::new(run, &plan.settings);
//!     let mut out = std::io::stdout();
//!     let prepared = planner.prepare(&mut out)?;
//!     let report = planner.execute(ExecutionMode::Submit, &prepared, &mut SystemLauncher, &mut out)?;
//!     println!("{} submitted", report.succeeded());
//! }
//! # Ok(())
//! # }
//! ```

pub mod collect;
pub mod config;
pub mod dataset;
pub mod grid;
pub mod layout;
pub mod partition;
pub mod planner;
pub mod runner;
pub mod script;
pub mod table;

pub use collect::{ResultTable, collect_results};
pub use config::{EnvironmentSettings, PlanFile, PlanSettings, RunConfig, SchedulerSettings};
pub use dataset::{DatasetPlan, run_datasets};
pub use grid::validate_grid;
pub use partition::{JobGroup, partition};
pub use planner::{JobPlanner, PreparedRun};
pub use runner::{
    ExecutionMode, Invocation, Launcher, ProcessExit, RunReport, StepOutcome, StepStatus,
    SystemLauncher, prompt_execution_mode,
};
pub use script::write_job_script;
pub use table::{BinSet, count_unique_bins};
