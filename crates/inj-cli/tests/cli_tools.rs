use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_injplan"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("injplan_tools_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

#[test]
fn version_prints_crate_version() {
    let out = run(&["version"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.trim(), format!("injplan {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn bins_counts_unique_bounds() {
    let dir = tmp_dir("bins");
    let table = dir.join("table.csv");
    std::fs::write(&table, "X_min,X_max,AUT\n0,0.1,1\n0,0.1,2\n0.1,0.2,3\n").unwrap();

    let out = run(&["bins", "--table", table.to_str().unwrap(), "--grid", "X"]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Detected 2 unique bins for grid X."));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bins_with_custom_axes_and_delimiter() {
    let dir = tmp_dir("bins_custom");
    let table = dir.join("table.tsv");
    std::fs::write(&table, "X_min\tX_max\tMh_min\tMh_max\n0\t1\t0\t1\n0\t1\t1\t2\n0\t1\t1\t2\n").unwrap();

    let out = run(&[
        "bins",
        "--table",
        table.to_str().unwrap(),
        "--grid",
        "X, Mh",
        "--allowed",
        "X,Mh",
        "--delimiter",
        "\t",
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Detected 2 unique bins for grid X,Mh."));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bins_reports_every_invalid_axis() {
    let dir = tmp_dir("bins_invalid");
    let table = dir.join("table.csv");
    std::fs::write(&table, "X_min,X_max\n0,1\n").unwrap();

    let out = run(&["bins", "--table", table.to_str().unwrap(), "--grid", "X,Foo,Bar"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Invalid grid values: Foo, Bar"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bins_missing_columns_fail() {
    let dir = tmp_dir("bins_columns");
    let table = dir.join("table.csv");
    std::fs::write(&table, "X_min,X_max\n0,1\n").unwrap();

    let out = run(&["bins", "--table", table.to_str().unwrap(), "--grid", "X,Q"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Q_min"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bins_missing_table_fails() {
    let out = run(&["bins", "--table", "/nonexistent/table.csv"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("/nonexistent/table.csv"));
}

fn write_outputs(dir: &Path) {
    std::fs::write(
        dir.join("bins_0_to_1.yaml"),
        "jobs:\n  - bin_index: 1\n    events: 12\n    X_min: 0.1\n  - bin_index: 0\n    events: 9\n    X_min: 0.0\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("bins_2_to_2.yaml"),
        "jobs:\n  - bin_index: 2\n    events: 4\n    X_min: 0.2\n    AUT: 0.03\n",
    )
    .unwrap();
}

#[test]
fn collect_merges_outputs_into_csv() {
    let dir = tmp_dir("collect");
    write_outputs(&dir);

    let out = run(&["collect", "--dir", dir.to_str().unwrap()]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Collected 3 bins into"));

    let csv = std::fs::read_to_string(dir.join("summary.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "bin_index,events,X_min,AUT");
    assert!(lines[1].starts_with("0,9,"));
    assert!(lines[2].starts_with("1,12,"));
    assert_eq!(lines[3], "2,4,0.2,0.03");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn collect_to_explicit_output() {
    let dir = tmp_dir("collect_out");
    write_outputs(&dir);
    std::fs::write(dir.join("broken.yaml"), "jobs: [ : : :").unwrap();
    let target = dir.join("merged.csv");

    let out = run(&["collect", "--dir", dir.to_str().unwrap(), "--output", target.to_str().unwrap()]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Skipped 1 unreadable files"));
    assert!(target.is_file());
    assert!(!dir.join("summary.csv").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn collect_missing_dir_fails() {
    let out = run(&["collect", "--dir", "/nonexistent/injectout"]);
    assert!(!out.status.success());
}

#[cfg(unix)]
#[test]
fn dataset_runs_each_runcard_in_workdir() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tmp_dir("dataset");
    let runner = dir.join("runner.sh");
    std::fs::write(&runner, "#!/bin/sh\necho \"cwd=$(pwd) $*\"\necho \"ld=$LD_LIBRARY_PATH\"\n")
        .unwrap();
    let mut perm = std::fs::metadata(&runner).unwrap().permissions();
    perm.set_mode(0o755);
    std::fs::set_permissions(&runner, perm).unwrap();

    let out = run(&[
        "dataset",
        "--workdir",
        dir.to_str().unwrap(),
        "--runcard",
        "a.yaml",
        "--runcard",
        "b.yaml",
        "--runner",
        runner.to_str().unwrap(),
        "--library-path",
        "/opt/root/lib",
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("--runcard a.yaml"));
    assert!(stdout.contains("--runcard b.yaml"));
    assert!(stdout.contains(&format!("cwd={}", dir.display())));
    assert_eq!(stdout.matches("ld=/opt/root/lib").count(), 2);
    assert!(stdout.contains("0 of 2 runcards failed."));
    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn dataset_failure_sets_exit_status() {
    let dir = tmp_dir("dataset_fail");
    let out = run(&[
        "dataset",
        "--workdir",
        dir.to_str().unwrap(),
        "--runcard",
        "a.yaml",
        "--runner",
        "/bin/false",
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("1 of 1 runcards failed"));
    let _ = std::fs::remove_dir_all(&dir);
}
