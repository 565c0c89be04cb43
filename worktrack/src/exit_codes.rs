//! Stable exit codes for worktrack CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments, missing records, store or config errors.
pub const INVALID: i32 = 1;
/// `worktrack verify` found files outside the declared areas.
pub const SCOPE_MISMATCH: i32 = 2;
/// `worktrack diff` could not run the version-control probe.
pub const DIFF_UNAVAILABLE: i32 = 3;
