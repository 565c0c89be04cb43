//! Snapshot creation at the start of a unit of work.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::core::types::SnapshotDescriptor;
use crate::io::config::FingerprintConfig;
use crate::io::fingerprint::ChecksumFallbackProbe;
use crate::io::git::VcsProbe;

/// Capture the "before" state of `root`.
///
/// Returns the current revision when `root` is inside a version-controlled
/// tree. Any probe failure degrades to a fingerprint snapshot instead of
/// erroring. Nothing is written to the tree.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn create_snapshot<P: VcsProbe + ?Sized>(
    probe: &P,
    root: &Path,
    fingerprint: &FingerprintConfig,
) -> SnapshotDescriptor {
    match probe.is_tracked(root) {
        Ok(true) => match probe.current_revision(root) {
            Ok(id) => {
                debug!(revision = %id, "versioned snapshot");
                return SnapshotDescriptor::Versioned { id };
            }
            Err(err) => warn!(err = %err, "revision probe failed, falling back to fingerprints"),
        },
        Ok(false) => debug!("not a tracked tree, using fingerprints"),
        Err(err) => warn!(err = %err, "tracked-tree probe failed, falling back to fingerprints"),
    }

    let payload = ChecksumFallbackProbe::new(fingerprint.clone()).fingerprint(root);
    let id = format!("fingerprint-{}", chrono::Utc::now().timestamp_millis());
    info!(snapshot = %id, files = payload.len(), "fingerprint snapshot");
    SnapshotDescriptor::Fingerprint { id, payload }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedFailure, ScriptedProbe, write_file};

    #[test]
    fn tracked_tree_yields_revision() {
        let temp = tempfile::tempdir().expect("tempdir");
        let probe = ScriptedProbe::tracked_at("abc123");
        let desc = create_snapshot(&probe, temp.path(), &FingerprintConfig::default());
        assert_eq!(
            desc,
            SnapshotDescriptor::Versioned {
                id: "abc123".to_string()
            }
        );
    }

    #[test]
    fn untracked_tree_yields_fingerprints() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_file(temp.path(), "src/lib.rs", "pub fn f() {}");
        let probe = ScriptedProbe::untracked();
        let desc = create_snapshot(&probe, temp.path(), &FingerprintConfig::default());
        match desc {
            SnapshotDescriptor::Fingerprint { id, payload } => {
                assert!(id.starts_with("fingerprint-"));
                assert!(payload.contains_key("src/lib.rs"));
            }
            other => panic!("expected fingerprint snapshot, got {other:?}"),
        }
    }

    #[test]
    fn probe_failure_degrades_to_fingerprints() {
        let temp = tempfile::tempdir().expect("tempdir");
        let probe = ScriptedProbe::untracked().with_tracked_failure(ScriptedFailure::Unavailable);
        let desc = create_snapshot(&probe, temp.path(), &FingerprintConfig::default());
        assert_eq!(desc.kind_label(), "fingerprint");
    }

    #[test]
    fn revision_failure_degrades_to_fingerprints() {
        let temp = tempfile::tempdir().expect("tempdir");
        let probe =
            ScriptedProbe::tracked_at("abc123").with_revision_failure(ScriptedFailure::Failed);
        let desc = create_snapshot(&probe, temp.path(), &FingerprintConfig::default());
        assert_eq!(desc.kind_label(), "fingerprint");
    }
}
