//! Slicing the bin index range into job groups.

use std::fmt;

use inj_core::{Error, Result};
use serde::Serialize;

/// Half-open range `[start, end)` of bin indices handled by one batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobGroup {
    pub start: usize,
    pub end: usize,
}

impl JobGroup {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Last index in the group (inclusive). This is what the injection binary
    /// receives as `--bin_index_end`.
    pub fn last(&self) -> usize {
        self.end.saturating_sub(1)
    }

    /// Name of the YAML file the injection binary writes for this group.
    pub fn out_filename(&self) -> String {
        format!("bins_{}_to_{}.yaml", self.start, self.last())
    }
}

impl fmt::Display for JobGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Partition `[0, n)` into contiguous groups of `group_size` (the last may be shorter).
pub fn partition(n: usize, group_size: usize) -> Result<Vec<JobGroup>> {
    if group_size == 0 {
        return Err(Error::config("bins per job must be positive"));
    }
    Ok((0..n)
        .step_by(group_size)
        .map(|start| JobGroup { start, end: (start + group_size).min(n) })
        .collect())
}
