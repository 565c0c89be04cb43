//! Classification of changed paths against declared work areas.
//!
//! Matching is substring containment on lowercased text, not glob or
//! path-segment parsing. An area named `auth` therefore also matches
//! `src/oauth/token.ts`; this imprecision is known and kept as-is.

use crate::core::types::ScopeVerdict;

/// Classify `changed_paths` as expected or unexpected for `declared_areas`.
///
/// An empty area list cannot be violated and always matches.
/// `unexpected_files` keeps the relative order of `changed_paths`.
pub fn verify_scope<P, A>(changed_paths: &[P], declared_areas: &[A]) -> ScopeVerdict
where
    P: AsRef<str>,
    A: AsRef<str>,
{
    if declared_areas.is_empty() {
        return ScopeVerdict::matched();
    }

    let areas: Vec<String> = declared_areas
        .iter()
        .map(|area| area.as_ref().to_lowercase())
        .collect();

    let unexpected_files: Vec<String> = changed_paths
        .iter()
        .map(|item| item.as_ref())
        .filter(|path| !areas.iter().any(|area| path_matches_area(path, area)))
        .map(str::to_string)
        .collect();

    if unexpected_files.is_empty() {
        return ScopeVerdict::matched();
    }

    let joined = declared_areas
        .iter()
        .map(|item| item.as_ref())
        .collect::<Vec<_>>()
        .join(", ");
    let warning = format!(
        "{} file(s) modified outside declared scope ({})",
        unexpected_files.len(),
        joined
    );

    ScopeVerdict {
        scope_match: false,
        unexpected_files,
        warnings: vec![warning],
    }
}

/// `area` must already be lowercased.
fn path_matches_area(path: &str, area: &str) -> bool {
    let path = path.to_lowercase();
    path.contains(area)
        || path.contains(&format!("/{area}/"))
        || path.starts_with(&format!("{area}/"))
}
