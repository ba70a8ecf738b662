//! injplan CLI

mod plan;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use inj_plan::ExecutionMode;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "injplan")]
#[command(about = "injplan - bin counting and SLURM job planning for injection studies")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write job scripts for every run in a plan file, then submit, run or cancel them
    Plan {
        /// Plan file (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Only process the run with this name
        #[arg(long)]
        run: Option<String>,

        /// Execution mode. Without it, an interactive prompt asks per run.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Write per-step outcomes as pretty JSON to this file (`-` for stdout).
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Count the unique bins of a binning table
    Bins {
        /// Binning table (CSV with {axis}_min / {axis}_max columns)
        #[arg(long)]
        table: PathBuf,

        /// Comma-separated grid axes
        #[arg(long, default_value = "X")]
        grid: String,

        /// Allowed grid axes
        #[arg(long, value_delimiter = ',', default_value = "X,Q,Z,PhPerp")]
        allowed: Vec<String>,

        /// Field delimiter of the table
        #[arg(long, default_value = ",")]
        delimiter: char,
    },

    /// Merge the per-group YAML outputs of a run directory into one CSV
    Collect {
        /// Output directory holding bins_<start>_to_<end>.yaml files
        #[arg(short, long)]
        dir: PathBuf,

        /// CSV destination. Defaults to <dir>/summary.csv.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate datasets by running the pipeline runner once per runcard
    Dataset {
        /// Pipeline checkout the runner is started in
        #[arg(long)]
        workdir: PathBuf,

        /// Runcard path (repeatable), relative to --workdir unless absolute
        #[arg(long = "runcard", required = true)]
        runcards: Vec<PathBuf>,

        /// Runner command; `--runcard <path>` is appended
        #[arg(long, default_value = inj_plan::dataset::DEFAULT_RUNNER)]
        runner: String,

        /// Directory prepended to the runner's LD_LIBRARY_PATH (repeatable)
        #[arg(long = "library-path")]
        library_paths: Vec<PathBuf>,
    },

    /// Print version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Submit every job script with the scheduler's submit command
    Submit,
    /// Run every job group directly, one after another
    Local,
    /// Write the scripts but do not run them
    Cancel,
}

impl From<ModeArg> for ExecutionMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Submit => ExecutionMode::Submit,
            ModeArg::Local => ExecutionMode::RunLocal,
            ModeArg::Cancel => ExecutionMode::Cancel,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Plan { config, run, mode, report } => {
            plan::cmd_plan(&config, run.as_deref(), mode.map(Into::into), report.as_ref())
        }
        Commands::Bins { table, grid, allowed, delimiter } => {
            cmd_bins(&table, &grid, &allowed, delimiter)
        }
        Commands::Collect { dir, output } => cmd_collect(&dir, output.as_ref()),
        Commands::Dataset { workdir, runcards, runner, library_paths } => {
            cmd_dataset(workdir, runcards, runner, library_paths)
        }
        Commands::Version => {
            println!("injplan {}", inj_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_bins(table: &PathBuf, grid: &str, allowed: &[String], delimiter: char) -> Result<()> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("--delimiter must be a single ASCII character, got {delimiter:?}"))?;
    let axes = inj_plan::validate_grid(grid, allowed)?;
    let bins = inj_plan::count_unique_bins(table, &axes, delimiter)
        .with_context(|| format!("failed to read binning table {}", table.display()))?;
    tracing::info!(rows = bins.rows_read(), unique = bins.len(), "table scanned");
    println!("Detected {} unique bins for grid {}.", bins.len(), axes.join(","));
    Ok(())
}

fn cmd_collect(dir: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let table = inj_plan::collect_results(dir)?;
    let out = output.cloned().unwrap_or_else(|| dir.join("summary.csv"));
    table.write_csv(&out).with_context(|| format!("failed to write {}", out.display()))?;
    println!("Collected {} bins into {}", table.len(), out.display());
    if !table.skipped_files.is_empty() {
        println!("Skipped {} unreadable files", table.skipped_files.len());
    }
    Ok(())
}

fn cmd_dataset(
    workdir: PathBuf,
    runcards: Vec<PathBuf>,
    runner: String,
    library_paths: Vec<PathBuf>,
) -> Result<()> {
    let mut plan = inj_plan::DatasetPlan { runner, ..inj_plan::DatasetPlan::new(workdir, runcards) };
    plan.environment.library_paths = library_paths;
    let mut stdout = std::io::stdout();
    let report = inj_plan::run_datasets(&plan, &mut inj_plan::SystemLauncher, &mut stdout)?;
    if !report.is_success() {
        anyhow::bail!("{} of {} runcards failed", report.failed(), report.attempted());
    }
    Ok(())
}

/// Pretty JSON to `output`, or to stdout when `output` is `-`.
pub(crate) fn write_json(output: &Path, value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    if output == Path::new("-") {
        println!("{text}");
    } else {
        std::fs::write(output, text)
            .with_context(|| format!("failed to write {}", output.display()))?;
    }
    Ok(())
}
