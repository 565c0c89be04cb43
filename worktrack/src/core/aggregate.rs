//! Container status derivation and numeric rollups.
//!
//! Everything here is a pure function of the children handed in. Callers
//! re-fetch children from the store before every call, which makes repeated
//! or concurrent recomputation safe: the same children always produce the
//! same status and the same totals.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::types::{ContainerStatus, UnitStatus};

/// Aggregation view of one direct child, unit or sub-container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Running,
    Succeeded,
    Partial,
    Failed,
}

impl ChildState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ChildState::Running)
    }
}

impl From<UnitStatus> for ChildState {
    fn from(status: UnitStatus) -> Self {
        match status {
            UnitStatus::Pending | UnitStatus::InProgress => ChildState::Running,
            UnitStatus::Success => ChildState::Succeeded,
            UnitStatus::PartialSuccess => ChildState::Partial,
            UnitStatus::Failed => ChildState::Failed,
        }
    }
}

impl From<ContainerStatus> for ChildState {
    fn from(status: ContainerStatus) -> Self {
        match status {
            ContainerStatus::Completed => ChildState::Succeeded,
            ContainerStatus::Failed => ChildState::Failed,
            ContainerStatus::Pending | ContainerStatus::InProgress | ContainerStatus::Blocked => {
                ChildState::Running
            }
        }
    }
}

/// Derive a container's status from its direct children.
///
/// - no children: `Pending`
/// - any child not terminal: `InProgress`, or `Blocked` when the overlay is set
/// - all terminal, any `Failed`: `Failed`
/// - all terminal, any `Partial`: `Failed`
/// - otherwise: `Completed`
///
/// The blocked overlay never masks a terminal status.
pub fn derive_container_status(children: &[ChildState], blocked: bool) -> ContainerStatus {
    let non_terminal = if blocked {
        ContainerStatus::Blocked
    } else {
        ContainerStatus::InProgress
    };

    if children.is_empty() {
        return if blocked {
            ContainerStatus::Blocked
        } else {
            ContainerStatus::Pending
        };
    }

    if children.iter().any(|child| !child.is_terminal()) {
        return non_terminal;
    }

    let any_failed = children.iter().any(|child| *child == ChildState::Failed);
    let any_partial = children.iter().any(|child| *child == ChildState::Partial);
    if any_failed || any_partial {
        ContainerStatus::Failed
    } else {
        ContainerStatus::Completed
    }
}

/// Numeric contribution of one direct child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildTotals {
    pub duration_ms: u64,
    pub tokens: u64,
    /// Every changed path the child (and its descendants) touched.
    pub files: BTreeSet<String>,
}

/// Totals recomputed from scratch on every status check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollup {
    pub total_duration_ms: u64,
    pub total_tokens: u64,
    pub distinct_files: usize,
    pub total_children: usize,
    pub succeeded_children: usize,
    pub failed_children: usize,
    pub running_children: usize,
}

/// Sum child totals and count child states.
///
/// Returns the rollup together with the union of changed paths so parents
/// can fold it into their own distinct count.
pub fn compute_rollup(children: &[(ChildState, ChildTotals)]) -> (Rollup, BTreeSet<String>) {
    let mut rollup = Rollup {
        total_children: children.len(),
        ..Rollup::default()
    };
    let mut files = BTreeSet::new();

    for (state, totals) in children {
        rollup.total_duration_ms = rollup.total_duration_ms.saturating_add(totals.duration_ms);
        rollup.total_tokens = rollup.total_tokens.saturating_add(totals.tokens);
        files.extend(totals.files.iter().cloned());
        match state {
            ChildState::Running => rollup.running_children += 1,
            ChildState::Succeeded => rollup.succeeded_children += 1,
            ChildState::Partial | ChildState::Failed => rollup.failed_children += 1,
        }
    }

    rollup.distinct_files = files.len();
    (rollup, files)
}
