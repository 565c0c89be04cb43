//! Completion-time diff between a snapshot and the live tree.
//!
//! The committed diff (snapshot revision to current revision) and the
//! working-tree diff (staged plus unstaged) are computed independently and
//! unioned, so the result is the same whether or not the agent committed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::change_set::{compose_working_tree, union_diffs};
use crate::core::invariants::validate_change_set;
use crate::core::types::{ChangeSet, DiffCompleteness, SnapshotDescriptor};
use crate::error::{TrackError, TrackResult};
use crate::io::git::{DiffRange, VcsProbe};

/// Change set plus a record of which diff halves could not be observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub changes: ChangeSet,
    pub completeness: DiffCompleteness,
    /// One entry per probe that contributed an empty default.
    pub gaps: Vec<String>,
}

impl DiffReport {
    /// Empty report for a probe that could not run at all.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            changes: ChangeSet::default(),
            completeness: DiffCompleteness::Unavailable,
            gaps: vec![reason.into()],
        }
    }
}

/// Compute the changes made since `descriptor` was taken.
///
/// Fingerprint snapshots always produce an empty change set. For versioned
/// snapshots, a failing individual probe contributes an empty result and is
/// recorded in `gaps`; `ProbeUnavailable` aborts with an error.
#[instrument(skip_all, fields(root = %root.display(), snapshot = %descriptor.id()))]
pub fn compute_diff<P: VcsProbe + ?Sized>(
    probe: &P,
    descriptor: &SnapshotDescriptor,
    root: &Path,
) -> TrackResult<DiffReport> {
    let start_rev = match descriptor {
        SnapshotDescriptor::Fingerprint { .. } => {
            debug!("fingerprint snapshot, no diff computed");
            return Ok(DiffReport {
                changes: ChangeSet::default(),
                completeness: DiffCompleteness::FingerprintOnly,
                gaps: Vec::new(),
            });
        }
        SnapshotDescriptor::Versioned { id } => id.as_str(),
    };

    let mut gaps = Vec::new();

    let current = absorb(probe.current_revision(root), "current revision", &mut gaps)?;
    let committed = match current.as_deref() {
        Some(current) if current == start_rev => {
            debug!("no commits since snapshot");
            Vec::new()
        }
        Some(current) => absorb(
            probe.diff_by_status(
                root,
                DiffRange::Revisions {
                    from: start_rev,
                    to: current,
                },
            ),
            "committed diff",
            &mut gaps,
        )?
        .unwrap_or_default(),
        None => Vec::new(),
    };

    let staged = absorb(probe.diff_by_status(root, DiffRange::Staged), "staged diff", &mut gaps)?
        .unwrap_or_default();
    let unstaged = absorb(
        probe.diff_by_status(root, DiffRange::Unstaged),
        "unstaged diff",
        &mut gaps,
    )?
    .unwrap_or_default();

    let working = compose_working_tree(&staged, &unstaged);
    let changes = union_diffs(&committed, &working);
    debug_assert!(validate_change_set(&changes).is_empty());

    let completeness = if gaps.is_empty() {
        DiffCompleteness::Complete
    } else {
        DiffCompleteness::Partial
    };
    debug!(
        added = changes.added.len(),
        modified = changes.modified.len(),
        deleted = changes.deleted.len(),
        ?completeness,
        "diff computed"
    );

    Ok(DiffReport {
        changes,
        completeness,
        gaps,
    })
}

/// Turn an absorbable probe failure into `None` plus a gap note.
fn absorb<T>(result: TrackResult<T>, what: &str, gaps: &mut Vec<String>) -> TrackResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err @ TrackError::ProbeUnavailable { .. }) => Err(err),
        Err(err) => {
            warn!(probe = what, err = %err, "probe failed, using empty result");
            gaps.push(format!("{what} unavailable: {err}"));
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StatusLine;
    use crate::test_support::{DiffSource, ScriptedFailure, ScriptedProbe};
    use std::collections::BTreeMap;

    fn root() -> &'static Path {
        Path::new("/repo")
    }

    fn versioned(id: &str) -> SnapshotDescriptor {
        SnapshotDescriptor::Versioned { id: id.to_string() }
    }

    #[test]
    fn fingerprint_snapshot_yields_empty_diff() {
        let probe = ScriptedProbe::tracked_at("abc123");
        let desc = SnapshotDescriptor::Fingerprint {
            id: "fingerprint-1".to_string(),
            payload: BTreeMap::new(),
        };
        let report = compute_diff(&probe, &desc, root()).expect("diff");
        assert!(report.changes.is_empty());
        assert_eq!(report.completeness, DiffCompleteness::FingerprintOnly);
        assert_eq!(probe.diff_calls(), 0);
    }

    #[test]
    fn unchanged_revision_skips_committed_diff() {
        let probe = ScriptedProbe::tracked_at("abc123")
            .with_diff(
                DiffSource::Committed,
                Ok(vec![StatusLine::Modified("never.ts".to_string())]),
            )
            .with_diff(
                DiffSource::Unstaged,
                Ok(vec![StatusLine::Modified("wip.ts".to_string())]),
            );
        let report = compute_diff(&probe, &versioned("abc123"), root()).expect("diff");
        assert_eq!(report.changes.modified, vec!["wip.ts".to_string()]);
        assert_eq!(report.completeness, DiffCompleteness::Complete);
    }

    #[test]
    fn committed_and_working_tree_are_unioned() {
        let probe = ScriptedProbe::tracked_at("def456")
            .with_diff(
                DiffSource::Committed,
                Ok(vec![StatusLine::Modified("file.ts".to_string())]),
            )
            .with_diff(
                DiffSource::Staged,
                Ok(vec![StatusLine::Added("new.ts".to_string())]),
            );
        let report = compute_diff(&probe, &versioned("abc123"), root()).expect("diff");
        assert_eq!(
            report.changes,
            ChangeSet {
                added: vec!["new.ts".to_string()],
                modified: vec!["file.ts".to_string()],
                deleted: Vec::new(),
            }
        );
    }

    #[test]
    fn invalid_revision_keeps_working_tree_half() {
        let probe = ScriptedProbe::tracked_at("def456")
            .with_diff(DiffSource::Committed, Err(ScriptedFailure::InvalidRevision))
            .with_diff(
                DiffSource::Unstaged,
                Ok(vec![StatusLine::Deleted("old.ts".to_string())]),
            );
        let report = compute_diff(&probe, &versioned("abc123"), root()).expect("diff");
        assert_eq!(report.changes.deleted, vec!["old.ts".to_string()]);
        assert_eq!(report.completeness, DiffCompleteness::Partial);
        assert_eq!(report.gaps.len(), 1);
        assert!(report.gaps[0].contains("committed diff"));
    }

    #[test]
    fn failed_half_contributes_empty_result() {
        let probe = ScriptedProbe::tracked_at("abc123")
            .with_diff(DiffSource::Staged, Err(ScriptedFailure::Failed))
            .with_diff(
                DiffSource::Unstaged,
                Ok(vec![StatusLine::Modified("a.ts".to_string())]),
            );
        let report = compute_diff(&probe, &versioned("abc123"), root()).expect("diff");
        assert_eq!(report.changes.modified, vec!["a.ts".to_string()]);
        assert_eq!(report.completeness, DiffCompleteness::Partial);
    }

    #[test]
    fn timed_out_half_keeps_the_other_half() {
        let probe = ScriptedProbe::tracked_at("def456")
            .with_diff(DiffSource::Committed, Err(ScriptedFailure::TimedOut))
            .with_diff(
                DiffSource::Unstaged,
                Ok(vec![StatusLine::Modified("README.md".to_string())]),
            );
        let report = compute_diff(&probe, &versioned("abc123"), root()).expect("diff");
        assert_eq!(report.changes.modified, vec!["README.md".to_string()]);
        assert_eq!(report.completeness, DiffCompleteness::Partial);
        assert!(report.gaps[0].contains("timed out"));
    }

    #[test]
    fn unavailable_probe_is_a_hard_error() {
        let probe = ScriptedProbe::tracked_at("abc123")
            .with_diff(DiffSource::Staged, Err(ScriptedFailure::Unavailable));
        let err = compute_diff(&probe, &versioned("abc123"), root()).expect_err("hard failure");
        assert!(err.is_probe_unavailable());
    }

    #[test]
    fn repeated_diff_without_tree_changes_is_identical() {
        let probe = ScriptedProbe::tracked_at("def456")
            .with_diff(
                DiffSource::Committed,
                Ok(vec![StatusLine::Renamed {
                    from: "old.txt".to_string(),
                    to: "new.txt".to_string(),
                }]),
            )
            .with_diff(
                DiffSource::Unstaged,
                Ok(vec![StatusLine::Modified("x.rs".to_string())]),
            );
        let first = compute_diff(&probe, &versioned("abc123"), root()).expect("first");
        let second = compute_diff(&probe, &versioned("abc123"), root()).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.changes.deleted, vec!["old.txt".to_string()]);
        assert_eq!(first.changes.added, vec!["new.txt".to_string()]);
    }
}
