//! Shared deterministic types for change tracking and status aggregation.
//!
//! These types define stable contracts between core components and the
//! persisted records. They do not depend on external state or I/O.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Status of a single tracked unit of work.
///
/// Units are created `InProgress`; `Pending` exists only for records written
/// by callers that pre-register work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Pending,
    InProgress,
    Success,
    PartialSuccess,
    Failed,
}

impl UnitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitStatus::Success | UnitStatus::PartialSuccess | UnitStatus::Failed
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            UnitStatus::Pending => "PENDING",
            UnitStatus::InProgress => "IN_PROGRESS",
            UnitStatus::Success => "SUCCESS",
            UnitStatus::PartialSuccess => "PARTIAL_SUCCESS",
            UnitStatus::Failed => "FAILED",
        }
    }
}

/// Status of a phase, workflow or mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

impl ContainerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ContainerStatus::Completed | ContainerStatus::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            ContainerStatus::Pending => "PENDING",
            ContainerStatus::InProgress => "IN_PROGRESS",
            ContainerStatus::Completed => "COMPLETED",
            ContainerStatus::Failed => "FAILED",
            ContainerStatus::Blocked => "BLOCKED",
        }
    }
}

/// How a path changed between the snapshot and the live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One parsed `--name-status` entry from the version-control probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Added(String),
    Modified(String),
    Deleted(String),
    Renamed { from: String, to: String },
}

/// Added/modified/deleted paths observed for one unit of work.
///
/// Each list is sorted ascending and no path appears in more than one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// All changed paths in `added`, `modified`, `deleted` order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .map(String::as_str)
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            added: self.added.len(),
            modified: self.modified.len(),
            deleted: self.deleted.len(),
        }
    }
}

/// Counts-only view of a [`ChangeSet`] for notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

/// Result of comparing changed paths against the declared work areas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeVerdict {
    pub scope_match: bool,
    pub unexpected_files: Vec<String>,
    pub warnings: Vec<String>,
}

impl ScopeVerdict {
    pub fn matched() -> Self {
        Self {
            scope_match: true,
            unexpected_files: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Opaque handle to the state of the tree when a unit of work began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SnapshotDescriptor {
    /// Revision id of the version-controlled tree.
    Versioned { id: String },
    /// Content digests of source-like files, keyed by relative path.
    Fingerprint {
        id: String,
        payload: BTreeMap<String, String>,
    },
}

impl SnapshotDescriptor {
    pub fn id(&self) -> &str {
        match self {
            SnapshotDescriptor::Versioned { id } | SnapshotDescriptor::Fingerprint { id, .. } => id,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            SnapshotDescriptor::Versioned { .. } => "versioned",
            SnapshotDescriptor::Fingerprint { .. } => "fingerprint",
        }
    }
}

/// How much of the diff could actually be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffCompleteness {
    /// Committed and working-tree halves were both observed.
    Complete,
    /// At least one half fell back to an empty result.
    Partial,
    /// The snapshot was a fingerprint set; no diff is computed for those.
    FingerprintOnly,
    /// The probe could not run at all; the change set is empty by necessity.
    Unavailable,
}
