//! Gathering per-group YAML outputs into one table.
//!
//! Every `bins_<start>_to_<end>.yaml` written by the injection binary holds a
//! top-level `jobs` list; each entry describes one bin and carries an integer
//! `bin_index` plus arbitrary result columns (`events`, `X_min`, ...).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use inj_core::{Error, Result};
use serde_yaml_ng::Value;

/// Bin entries from every output file, ordered by `bin_index`.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    /// `bin_index` first, then other keys in first-seen order.
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, Value>>,
    /// Files that were skipped because they could not be read or parsed.
    pub skipped_files: Vec<PathBuf>,
}

impl ResultTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as CSV. Missing cells are left empty.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            let record: Vec<String> =
                self.columns.iter().map(|c| row.get(c).map(cell_text).unwrap_or_default()).collect();
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml_ng::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn bin_index(entry: &serde_yaml_ng::Mapping) -> Option<u64> {
    entry.get("bin_index").and_then(Value::as_u64)
}

/// Read every `*.yaml` file in `dir` and merge their `jobs` entries.
pub fn collect_results(dir: &Path) -> Result<ResultTable> {
    if !dir.is_dir() {
        return Err(Error::NotFound(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("yaml"))
        .collect();
    files.sort();

    let mut table = ResultTable { columns: vec!["bin_index".to_string()], ..Default::default() };
    let mut entries: Vec<(u64, BTreeMap<String, Value>)> = Vec::new();

    for path in files {
        let parsed = std::fs::read(&path)
            .map_err(Error::from)
            .and_then(|b| serde_yaml_ng::from_slice::<Value>(&b).map_err(Error::from));
        let doc = match parsed {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable output");
                table.skipped_files.push(path);
                continue;
            }
        };
        let Some(jobs) = doc.get("jobs").and_then(Value::as_sequence) else {
            tracing::debug!(path = %path.display(), "no jobs list");
            continue;
        };
        for job in jobs {
            let Some(map) = job.as_mapping() else { continue };
            let Some(idx) = bin_index(map) else {
                tracing::warn!(path = %path.display(), "entry without integer bin_index skipped");
                continue;
            };
            let mut row = BTreeMap::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => s.clone(),
                    other => cell_text(other),
                };
                if !table.columns.contains(&key) {
                    table.columns.push(key.clone());
                }
                row.insert(key, v.clone());
            }
            entries.push((idx, row));
        }
    }

    entries.sort_by_key(|(idx, _)| *idx);
    table.rows = entries.into_iter().map(|(_, row)| row).collect();
    tracing::info!(dir = %dir.display(), rows = table.len(), "collected results");
    Ok(table)
}
