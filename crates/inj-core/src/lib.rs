//! # inj-core
//!
//! Shared pieces of the injplan workspace: the error taxonomy every crate
//! reports through, and the tool version stamped into run logs and manifests.

pub mod error;

pub use error::{Error, ErrorKind, Result};

/// Workspace version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
