//! Structural invariants for change sets.

use std::collections::HashSet;

use crate::core::types::ChangeSet;

/// Check the invariants every stored change set must satisfy:
/// - each list sorted ascending with no duplicates
/// - no path in more than one list
///
/// Returns a list of stable error messages (empty on success).
pub fn validate_change_set(changes: &ChangeSet) -> Vec<String> {
    let mut errors = Vec::new();
    let lists = [
        ("added", &changes.added),
        ("modified", &changes.modified),
        ("deleted", &changes.deleted),
    ];

    for (label, paths) in lists {
        if !strictly_sorted(paths) {
            errors.push(format!("{label}: paths must be sorted and unique"));
        }
    }

    let mut seen = HashSet::new();
    for (label, paths) in lists {
        for path in paths {
            if !seen.insert(path.as_str()) {
                errors.push(format!("{label}: '{path}' appears in more than one list"));
            }
        }
    }

    errors
}

fn strictly_sorted(paths: &[String]) -> bool {
    paths.windows(2).all(|pair| pair[0] < pair[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_unsorted_and_overlapping_lists() {
        let changes = ChangeSet {
            added: vec!["b".to_string(), "a".to_string()],
            modified: vec!["a".to_string()],
            deleted: Vec::new(),
        };
        let errors = validate_change_set(&changes);
        assert!(errors.iter().any(|err| err.contains("added: paths must be sorted")));
        assert!(errors.iter().any(|err| err.contains("'a' appears in more than one list")));
    }

    #[test]
    fn accepts_well_formed_change_set() {
        let changes = ChangeSet {
            added: vec!["a".to_string()],
            modified: vec!["b".to_string(), "c".to_string()],
            deleted: vec!["d".to_string()],
        };
        assert!(validate_change_set(&changes).is_empty());
    }
}
