//! Driver error definitions.
//!
//! This module defines the failures the run driver can report. It covers:
//! 1. **File system:** Reading, writing, copying or moving a named file.
//! 2. **Configuration:** JSON parse failures and out-of-range values.
//! 3. **Checkpoints:** Failures while persisting or restoring engine state.
//!
//! Stats polling during warmup never produces a `DriverError`; a missing or
//! unreadable stats file there only means "not yet done".

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by the run driver and its supporting modules.
#[derive(Debug, Error)]
pub enum DriverError {
    /// An I/O operation on `path` failed.
    #[error("{op} '{}': {source}", path.display())]
    Io {
        /// Short verb describing the failed operation (e.g. "read", "rename").
        op: &'static str,
        /// File or directory the operation targeted.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A configuration document could not be deserialized.
    #[error("invalid configuration JSON: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The engine could not write or restore a checkpoint.
    #[error("checkpoint '{}' failed: {reason}", path.display())]
    Checkpoint {
        /// Checkpoint directory.
        path: PathBuf,
        /// Human-readable reason.
        reason: String,
    },
}

impl DriverError {
    /// Builds an [`DriverError::Io`] for `op` on `path`.
    ///
    /// Intended for use with `map_err`:
    ///
    /// ```
    /// use simdrive_core::common::DriverError;
    ///
    /// let path = std::path::Path::new("/definitely/not/here.txt");
    /// let err = std::fs::read_to_string(path)
    ///     .map_err(|e| DriverError::io("read", path, e))
    ///     .unwrap_err();
    /// assert!(err.to_string().starts_with("read '/definitely/not/here.txt'"));
    /// ```
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, DriverError>;
