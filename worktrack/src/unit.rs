//! Stateless start/complete operations for one unit of work.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::scope::verify_scope;
use crate::core::types::{ScopeVerdict, SnapshotDescriptor};
use crate::diff::{DiffReport, compute_diff};
use crate::error::TrackResult;
use crate::io::config::FingerprintConfig;
use crate::io::git::VcsProbe;
use crate::snapshot::create_snapshot;

/// What a completed unit changed and whether it stayed in scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub report: DiffReport,
    pub verdict: ScopeVerdict,
}

impl UnitOutcome {
    /// Outcome for a unit whose diff could not be computed at all.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            report: DiffReport::unavailable(reason),
            verdict: ScopeVerdict::matched(),
        }
    }
}

/// Snapshot `root` before work begins.
#[instrument(skip_all, fields(root = %root.display(), areas = declared_areas.len()))]
pub fn start_unit<P: VcsProbe + ?Sized>(
    probe: &P,
    root: &Path,
    declared_areas: &[String],
    fingerprint: &FingerprintConfig,
) -> SnapshotDescriptor {
    let descriptor = create_snapshot(probe, root, fingerprint);
    info!(snapshot = %descriptor.id(), kind = descriptor.kind_label(), "unit started");
    descriptor
}

/// Diff against `descriptor` and check the changes against `declared_areas`.
///
/// Errors only when the probe cannot run at all.
#[instrument(skip_all, fields(root = %root.display(), snapshot = %descriptor.id()))]
pub fn complete_unit<P: VcsProbe + ?Sized>(
    probe: &P,
    descriptor: &SnapshotDescriptor,
    root: &Path,
    declared_areas: &[String],
) -> TrackResult<UnitOutcome> {
    let report = compute_diff(probe, descriptor, root)?;
    let paths: Vec<&str> = report.changes.paths().collect();
    let verdict = verify_scope(&paths, declared_areas);
    info!(
        changed = paths.len(),
        scope_match = verdict.scope_match,
        unexpected = verdict.unexpected_files.len(),
        "unit completed"
    );
    Ok(UnitOutcome { report, verdict })
}
