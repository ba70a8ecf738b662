//! Error types for injplan

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of an [`Error`].
///
/// `Config` and `NotFound` abort a run before any job script is written.
/// `Io` aborts the run during directory setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or malformed input table
    Config,
    /// A required input path does not exist
    NotFound,
    /// Filesystem failure while preparing or writing run artifacts
    Io,
}

/// injplan error type
#[derive(Error, Debug)]
pub enum Error {
    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more grid axes are not in the allowed set
    #[error("Invalid grid values: {}", .invalid.join(", "))]
    InvalidGrid {
        /// Every rejected axis name, in the order given
        invalid: Vec<String>,
    },

    /// The binning table lacks columns required by the requested axes
    #[error("Binning table {} is missing columns: {}", .table.display(), .columns.join(", "))]
    MissingColumns { table: PathBuf, columns: Vec<String> },

    /// Input path does not exist
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific artifact path
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed delimited table
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Helper for building a [`Error::Config`] from anything printable.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Wrap an I/O error with the path it concerns.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Write { path: path.into(), source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_)
            | Error::InvalidGrid { .. }
            | Error::MissingColumns { .. }
            | Error::Yaml(_)
            | Error::Json(_) => ErrorKind::Config,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Io(_) | Error::Write { .. } => ErrorKind::Io,
            Error::Csv(e) => match e.kind() {
                csv::ErrorKind::Io(_) => ErrorKind::Io,
                _ => ErrorKind::Config,
            },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
