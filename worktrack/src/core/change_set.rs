//! Merging of per-source diffs into one [`ChangeSet`].

use std::collections::BTreeMap;

use crate::core::types::{ChangeKind, ChangeSet, StatusLine};

/// Merge the committed diff and the working-tree diff.
///
/// Committed entries are applied first, then working-tree entries, so the
/// working tree wins whenever both report the same path. A rename is applied
/// as a delete of the old path followed by an add of the new path.
pub fn union_diffs(committed: &[StatusLine], working: &[StatusLine]) -> ChangeSet {
    let mut last_seen: BTreeMap<String, ChangeKind> = BTreeMap::new();
    for line in committed.iter().chain(working) {
        apply_line(&mut last_seen, line);
    }
    split_by_kind(last_seen)
}

/// Compose the staged and unstaged diffs (both relative to the current
/// revision) into one working-tree diff.
///
/// Unstaged entries describe the working copy relative to the index, so a
/// path staged as added stays added when edited again, and disappears when
/// the added file is removed before being committed.
pub fn compose_working_tree(staged: &[StatusLine], unstaged: &[StatusLine]) -> Vec<StatusLine> {
    let mut last_seen: BTreeMap<String, ChangeKind> = BTreeMap::new();
    for line in staged {
        apply_line(&mut last_seen, line);
    }
    for line in unstaged {
        for (path, kind) in expand(line) {
            let staged_added = last_seen.get(&path) == Some(&ChangeKind::Added);
            match kind {
                ChangeKind::Modified if staged_added => {}
                ChangeKind::Deleted if staged_added => {
                    last_seen.remove(&path);
                }
                kind => {
                    last_seen.insert(path, kind);
                }
            }
        }
    }
    last_seen
        .into_iter()
        .map(|(path, kind)| match kind {
            ChangeKind::Added => StatusLine::Added(path),
            ChangeKind::Modified => StatusLine::Modified(path),
            ChangeKind::Deleted => StatusLine::Deleted(path),
        })
        .collect()
}

fn expand(line: &StatusLine) -> Vec<(String, ChangeKind)> {
    match line {
        StatusLine::Added(path) => vec![(path.clone(), ChangeKind::Added)],
        StatusLine::Modified(path) => vec![(path.clone(), ChangeKind::Modified)],
        StatusLine::Deleted(path) => vec![(path.clone(), ChangeKind::Deleted)],
        StatusLine::Renamed { from, to } => vec![
            (from.clone(), ChangeKind::Deleted),
            (to.clone(), ChangeKind::Added),
        ],
    }
}

fn apply_line(last_seen: &mut BTreeMap<String, ChangeKind>, line: &StatusLine) {
    for (path, kind) in expand(line) {
        last_seen.insert(path, kind);
    }
}

/// BTreeMap iteration is ordered, so each list comes out sorted and a path
/// lands in exactly one list.
fn split_by_kind(last_seen: BTreeMap<String, ChangeKind>) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for (path, kind) in last_seen {
        match kind {
            ChangeKind::Added => changes.added.push(path),
            ChangeKind::Modified => changes.modified.push(path),
            ChangeKind::Deleted => changes.deleted.push(path),
        }
    }
    changes
}
