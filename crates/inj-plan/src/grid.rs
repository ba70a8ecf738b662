//! Grid axis validation.

use inj_core::{Error, Result};

/// Axes the injection binary understands out of the box.
pub const DEFAULT_AXES: [&str; 4] = ["X", "Q", "Z", "PhPerp"];

/// Split a comma-separated axis list and check every name against `allowed`.
///
/// All names are checked before returning, so a single error reports every
/// unknown axis. The accepted names keep the order they were given in.
pub fn validate_grid<S: AsRef<str>>(grid: &str, allowed: &[S]) -> Result<Vec<String>> {
    let axes: Vec<String> = grid.split(',').map(|s| s.trim().to_string()).collect();
    if axes.iter().all(|a| a.is_empty()) {
        return Err(Error::config("grid must name at least one axis"));
    }

    let invalid: Vec<String> = axes
        .iter()
        .filter(|a| !allowed.iter().any(|ok| ok.as_ref() == a.as_str()))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(Error::InvalidGrid { invalid });
    }
    Ok(axes)
}

/// Column names `{axis}_min`, `{axis}_max` for each axis, in axis order.
pub fn bound_columns(axes: &[String]) -> Vec<String> {
    axes.iter().flat_map(|a| [format!("{a}_min"), format!("{a}_max")]).collect()
}
