//! Binning table reader and bin deduplication.
//!
//! A binning table is a delimited text file with a header row. For every grid
//! axis `g` it carries `g_min` and `g_max` columns; other columns (asymmetry
//! values, target/hadron ids, ...) are ignored here. Rows that share the same
//! boundaries on every requested axis describe the same physical bin.
//!
//! Deduplication compares the parsed `f64` values bit for bit. There is no
//! tolerance: `0.1` written two different ways that round to different floats
//! counts as two bins, and `0.0` / `-0.0` are distinct.

use std::collections::HashSet;
use std::path::Path;

use inj_core::{Error, Result};

use crate::grid::bound_columns;

/// Concatenated `(min, max)` boundaries of one bin, in axis order.
///
/// Stored as raw bit patterns so equality and hashing are exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinKey(Vec<u64>);

impl BinKey {
    pub fn from_bounds(bounds: &[f64]) -> Self {
        Self(bounds.iter().map(|v| v.to_bits()).collect())
    }

    pub fn bounds(&self) -> Vec<f64> {
        self.0.iter().map(|b| f64::from_bits(*b)).collect()
    }
}

/// Set of unique bins found in a table.
#[derive(Debug, Clone, Default)]
pub struct BinSet {
    keys: HashSet<BinKey>,
    rows_read: usize,
}

impl BinSet {
    /// Number of unique bins (`N`).
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of data rows the set was built from, duplicates included.
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    pub fn contains(&self, bounds: &[f64]) -> bool {
        self.keys.contains(&BinKey::from_bounds(bounds))
    }

    fn insert(&mut self, key: BinKey) {
        self.rows_read += 1;
        self.keys.insert(key);
    }
}

/// Read `table` and collect the unique bins over `axes`.
///
/// `delimiter` is the field separator (`b','` for the usual CSV tables).
/// Column lookup is by header name, so column order in the file does not matter.
pub fn count_unique_bins(table: &Path, axes: &[String], delimiter: u8) -> Result<BinSet> {
    if !table.exists() {
        return Err(Error::NotFound(table.to_path_buf()));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(table)?;

    let headers = rdr.headers()?.clone();
    let wanted = bound_columns(axes);

    let mut indices = Vec::with_capacity(wanted.len());
    let mut missing = Vec::new();
    for col in &wanted {
        match headers.iter().position(|h| h == col) {
            Some(i) => indices.push(i),
            None => missing.push(col.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(Error::MissingColumns { table: table.to_path_buf(), columns: missing });
    }

    let mut bins = BinSet::default();
    let mut bounds = Vec::with_capacity(indices.len());
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        bounds.clear();
        for (col, &idx) in wanted.iter().zip(&indices) {
            let cell = record.get(idx).unwrap_or("");
            let value: f64 = cell.parse().map_err(|_| {
                Error::config(format!(
                    "{}: row {}: column '{col}' is not a number: {cell:?}",
                    table.display(),
                    row + 1
                ))
            })?;
            bounds.push(value);
        }
        bins.insert(BinKey::from_bounds(&bounds));
    }

    tracing::debug!(
        table = %table.display(),
        rows = bins.rows_read(),
        unique = bins.len(),
        "binning table read"
    );
    Ok(bins)
}
