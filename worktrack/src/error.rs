//! Typed failures surfaced by probes, diffing and aggregation.

use std::path::PathBuf;

/// Errors produced by the tracking engine.
///
/// Probe-level variants, timeouts included, are absorbed with empty defaults
/// wherever a partial result still means something; `ProbeUnavailable` after
/// a versioned snapshot and `AggregationInconsistency` reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// The version-control tool could not be started at all.
    #[error("version-control probe unavailable: {reason}")]
    ProbeUnavailable { reason: String },

    /// One probe query ran past its deadline and was killed.
    #[error("probe command `{command}` timed out after {timeout_secs}s")]
    ProbeTimedOut { command: String, timeout_secs: u64 },

    /// The probe ran but exited unsuccessfully.
    #[error("probe command `{command}` failed: {stderr}")]
    ProbeFailed { command: String, stderr: String },

    /// A stored revision id can no longer be resolved.
    #[error("revision '{revision}' cannot be resolved")]
    InvalidRevision { revision: String },

    /// A single file could not be read while fingerprinting.
    #[error("read {}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A container's child record is missing or malformed.
    #[error("container '{container_id}' child '{child_id}' is inconsistent: {reason}")]
    AggregationInconsistency {
        container_id: String,
        child_id: String,
        reason: String,
    },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A terminal record was asked to change state again.
    #[error("{kind} '{id}' is already {status}")]
    InvalidTransition {
        kind: &'static str,
        id: String,
        status: &'static str,
    },

    #[error("completion status must be terminal, got {status}")]
    NonTerminalStatus { status: &'static str },

    #[error("invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// The persistence collaborator failed.
    #[error("record store: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl TrackError {
    /// True when the probe itself could not run, as opposed to one query failing.
    pub fn is_probe_unavailable(&self) -> bool {
        matches!(self, TrackError::ProbeUnavailable { .. })
    }
}

pub type TrackResult<T> = Result<T, TrackError>;
