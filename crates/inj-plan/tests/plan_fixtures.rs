use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use inj_plan::{ExecutionMode, JobGroup, JobPlanner, PlanFile, RunConfig};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("inj_plan_it_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

/// Point a fixture run at scratch inputs under `root`.
fn relocate(run: &RunConfig, root: &Path, table_text: &str) -> RunConfig {
    let table = root.join("table.csv");
    std::fs::write(&table, table_text).unwrap();
    let file = root.join("analysis.root");
    std::fs::write(&file, b"").unwrap();
    RunConfig { main_outdir: root.join("injectout"), table, file, ..run.clone() }
}

#[test]
fn filippo_fixture_loads() {
    let plan = PlanFile::load(&fixture("filippo_runs.yaml")).unwrap();
    assert_eq!(plan.runs.len(), 3);
    let energies: Vec<&str> = plan.runs.iter().map(|r| r.energy.as_str()).collect();
    assert_eq!(energies, vec!["5x41", "10x100", "18x275"]);
    assert!(plan.runs.iter().all(|r| r.max_entries == 500_000_000 && r.bins_per_job == 1));
    assert_eq!(
        plan.runs[1].output_dir(),
        PathBuf::from("analysis/filippo/injectout/Hadron/10x100/Full/Proton/X")
    );
    assert_eq!(plan.settings.environment.library_paths.len(), 1);
}

#[test]
fn yorgo_fixture_needs_extended_axes() {
    let plan = PlanFile::load(&fixture("yorgo_runs.yaml")).unwrap();
    let four_d = plan.select(Some("ep_10x100_4d")).unwrap()[0];
    assert_eq!(four_d.axes(&plan.settings.allowed_axes).unwrap(), vec!["X", "Q", "Z", "Mh"]);
    assert!(four_d.axes(&inj_plan::grid::DEFAULT_AXES).is_err());
}

#[test]
fn json_fixture_loads() {
    let plan = PlanFile::load(&fixture("yorgo_runs.json")).unwrap();
    assert_eq!(plan.settings.scheduler.time, "12:00:00");
    assert_eq!(plan.settings.scheduler.account, "eic");
    assert_eq!(plan.runs[0].bins_per_job, 5);
}

#[test]
fn four_dimensional_grid_plans_jobs() {
    let plan = PlanFile::load(&fixture("yorgo_runs.yaml")).unwrap();
    let run = plan.select(Some("ep_10x100_4d")).unwrap()[0];
    let root = tmp_dir("four_d");

    // 2 X bins x 2 Q bins, Z/Mh fixed; every row repeated for two hadron ids.
    let mut table = String::from("itar,ihad,X_min,X_max,Q_min,Q_max,Z_min,Z_max,Mh_min,Mh_max,AUT\n");
    for ihad in 1..=2 {
        for (x0, x1) in [(0.0, 0.1), (0.1, 0.2)] {
            for (q0, q1) in [(1.0, 2.0), (2.0, 4.0)] {
                table.push_str(&format!("1,{ihad},{x0},{x1},{q0},{q1},0.2,0.8,0,9999,0.01\n"));
            }
        }
    }
    let cfg = relocate(run, &root, &table);

    let planner = JobPlanner::new(&cfg, &plan.settings);
    let mut console = Vec::new();
    let prepared = planner.prepare(&mut console).unwrap();
    assert_eq!(prepared.bins, 4);
    assert_eq!(prepared.groups, vec![JobGroup { start: 0, end: 4 }]);
    assert!(prepared.layout.out_dir.ends_with("Dihadron/10x100/EarlyScience/Proton/X,Q,Z,Mh"));

    let script = std::fs::read_to_string(&prepared.scripts[0]).unwrap();
    assert!(script.contains("--grid X,Q,Z,Mh"));
    assert!(script.contains("--bin_index_start 0 --bin_index_end 3"));

    let report = planner
        .execute(ExecutionMode::Cancel, &prepared, &mut inj_plan::SystemLauncher, &mut console)
        .unwrap();
    assert_eq!(report.attempted(), 0);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn end_to_end_twelve_bins() {
    let plan = PlanFile::load(&fixture("yorgo_runs.json")).unwrap();
    let root = tmp_dir("twelve");
    let mut table = String::from("X_min,X_max\n");
    for i in 0..12 {
        table.push_str(&format!("{},{}\n", i, i + 1));
        table.push_str(&format!("{},{}\n", i, i + 1));
    }
    let cfg = relocate(&plan.runs[0], &root, &table);
    assert_eq!(cfg.max_entries, 10_000);

    let prepared = JobPlanner::new(&cfg, &plan.settings).prepare(&mut std::io::sink()).unwrap();
    let ranges: Vec<(usize, usize)> = prepared.groups.iter().map(|g| (g.start, g.end)).collect();
    assert_eq!(ranges, vec![(0, 5), (5, 10), (10, 12)]);
    assert_eq!(prepared.scripts.len(), 3);
    for script in &prepared.scripts {
        let text = std::fs::read_to_string(script).unwrap();
        assert!(text.contains("#SBATCH --time=12:00:00"));
        assert!(text.contains("--maxEntries 10000"));
    }
    let _ = std::fs::remove_dir_all(&root);
}
