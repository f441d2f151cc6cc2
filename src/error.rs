// src/error.rs

//! Error taxonomy for quarry
//!
//! Resolution and lock errors abort an operation before any filesystem
//! mutation. Apply-phase errors are isolated per package or per file and
//! surface here only when they are fatal under the active force flags.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No candidate pool can satisfy a requirement. The message carries the
    /// aggregated list of offenders so the user sees every problem at once.
    #[error("unsatisfiable requirement(s):\n{details}")]
    Unsatisfiable { details: String },

    /// The resolver's combination cap was exceeded.
    #[error("dependency search exhausted after checking {checked} candidate combinations (cap {cap})")]
    SearchExhausted { checked: u64, cap: u64 },

    /// The resolver enumerated every combination without finding a solution.
    #[error("no consistent candidate assignment found ({checked} combinations checked)")]
    NoSolution { checked: u64 },

    /// Package-vs-package or file-vs-file conflict.
    #[error("conflict detected:\n{details}")]
    Conflict { details: String },

    /// Another process holds the repository lock.
    #[error("repository is locked by PID {pid} ({path})")]
    LockHeld { pid: i32, path: PathBuf },

    /// A lifecycle hook script exited nonzero.
    #[error("{phase} hook failed for package '{package}' (exit status {status})")]
    HookFailure {
        package: String,
        phase: &'static str,
        status: i32,
    },

    /// Filesystem ownership/permission operation refused while running with
    /// elevated privilege. Non-privileged callers get a warning instead.
    #[error("privilege denied: {0}")]
    PrivilegeDenied(String),

    /// Removing these packages would leave installed dependents broken.
    #[error("removal would break installed package(s):\n{details}")]
    WouldBreakDependents { details: String },

    #[error("package '{0}' is not installed")]
    NotInstalled(String),

    #[error("invalid package spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("corrupt state record at {path}: {source}")]
    CorruptState {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("state serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an aggregated `Unsatisfiable` from per-requirement diagnostics.
    pub fn unsatisfiable(offenders: impl IntoIterator<Item = String>) -> Self {
        let details = offenders
            .into_iter()
            .map(|s| format!("  - {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        Error::Unsatisfiable { details }
    }

    pub fn conflict(offenders: impl IntoIterator<Item = String>) -> Self {
        let details = offenders
            .into_iter()
            .map(|s| format!("  - {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        Error::Conflict { details }
    }
}
