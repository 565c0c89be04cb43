//! Version-control probe.
//!
//! The tracker only ever reads from the repository: whether a path is inside
//! a work tree, the current revision, and `--name-status` diffs. Every call
//! goes through [`run_probe`] so a hung `git` trips the configured timeout.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::types::StatusLine;
use crate::error::{TrackError, TrackResult};
use crate::io::process::{ProbeLimits, ProbeOutput, render_command, run_probe};

static REVISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{4,64}$").expect("revision regex"));

/// Which two states a diff compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffRange<'a> {
    /// Committed history between two revisions.
    Revisions { from: &'a str, to: &'a str },
    /// Index relative to the current revision.
    Staged,
    /// Working copy relative to the index.
    Unstaged,
}

/// Read-only capability over an external version-control system.
pub trait VcsProbe: Send + Sync {
    /// True if `root` is inside a version-controlled work tree.
    fn is_tracked(&self, root: &Path) -> TrackResult<bool>;

    /// Identifier of the revision currently checked out at `root`.
    fn current_revision(&self, root: &Path) -> TrackResult<String>;

    /// Path/status entries for `range`.
    fn diff_by_status(&self, root: &Path, range: DiffRange<'_>) -> TrackResult<Vec<StatusLine>>;
}

/// [`VcsProbe`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitProbe {
    program: PathBuf,
    limits: ProbeLimits,
}

impl GitProbe {
    pub fn new(limits: ProbeLimits) -> Self {
        Self {
            program: PathBuf::from("git"),
            limits,
        }
    }

    /// Use a specific git executable (mainly for tests and unusual installs).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, root: &Path, args: &[&str]) -> TrackResult<ProbeOutput> {
        let program = self.program.to_string_lossy();
        run_probe(&program, args, root, self.limits)
    }

    /// Stdout of a successful run. Output cut off at the limit is an error:
    /// a partial name-status stream would parse into bogus paths.
    fn run_checked(&self, root: &Path, args: &[&str]) -> TrackResult<String> {
        let output = self.run(root, args)?;
        if !output.status.success() {
            return Err(TrackError::ProbeFailed {
                command: render_command(&self.program.to_string_lossy(), args),
                stderr: output.stderr_text(),
            });
        }
        if output.stdout_truncated > 0 {
            return Err(TrackError::ProbeFailed {
                command: render_command(&self.program.to_string_lossy(), args),
                stderr: format!(
                    "output exceeded {} bytes ({} bytes dropped)",
                    self.limits.output_limit_bytes, output.stdout_truncated
                ),
            });
        }
        Ok(output.stdout_text())
    }

    /// Resolve any commit-ish git understands (`main`, `HEAD~1`, a short or
    /// uppercase id) to the full lowercase commit id.
    #[instrument(skip_all, fields(root = %root.display(), revision = %revision))]
    pub fn resolve_revision(&self, root: &Path, revision: &str) -> TrackResult<String> {
        let invalid = || TrackError::InvalidRevision {
            revision: revision.to_string(),
        };
        if revision.is_empty() || revision.starts_with('-') {
            return Err(invalid());
        }
        let spec = format!("{revision}^{{commit}}");
        let output = self.run(root, &["rev-parse", "--verify", "--quiet", &spec])?;
        if !output.status.success() {
            return Err(invalid());
        }
        let id = output.stdout_text().trim().to_string();
        if !REVISION_RE.is_match(&id) {
            return Err(invalid());
        }
        debug!(id = %id, "resolved revision");
        Ok(id)
    }

    /// Fail with `InvalidRevision` unless `revision` names an existing commit.
    fn ensure_revision(&self, root: &Path, revision: &str) -> TrackResult<()> {
        if !REVISION_RE.is_match(revision) {
            warn!(revision, "stored revision is not a commit id");
            return Err(TrackError::InvalidRevision {
                revision: revision.to_string(),
            });
        }
        let spec = format!("{revision}^{{commit}}");
        let output = self.run(root, &["cat-file", "-e", &spec])?;
        if !output.status.success() {
            warn!(revision, "stored revision no longer resolves");
            return Err(TrackError::InvalidRevision {
                revision: revision.to_string(),
            });
        }
        Ok(())
    }
}

impl VcsProbe for GitProbe {
    #[instrument(skip_all, fields(root = %root.display()))]
    fn is_tracked(&self, root: &Path) -> TrackResult<bool> {
        let output = self.run(root, &["rev-parse", "--is-inside-work-tree"])?;
        let tracked = output.status.success() && output.stdout_text().trim() == "true";
        debug!(tracked, "probed work tree");
        Ok(tracked)
    }

    fn current_revision(&self, root: &Path) -> TrackResult<String> {
        let out = self.run_checked(root, &["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    #[instrument(skip_all, fields(root = %root.display(), range = ?range))]
    fn diff_by_status(&self, root: &Path, range: DiffRange<'_>) -> TrackResult<Vec<StatusLine>> {
        let base = ["diff", "--name-status", "-M", "-z", "--no-color"];
        let out = match range {
            DiffRange::Revisions { from, to } => {
                self.ensure_revision(root, from)?;
                let mut args = base.to_vec();
                args.extend([from, to]);
                self.run_checked(root, &args)?
            }
            DiffRange::Staged => {
                let mut args = base.to_vec();
                args.push("--cached");
                self.run_checked(root, &args)?
            }
            DiffRange::Unstaged => self.run_checked(root, &base)?,
        };
        let lines = parse_name_status_z(&out);
        debug!(entries = lines.len(), "parsed diff");
        Ok(lines)
    }
}

/// Parse `git diff --name-status -z` output.
///
/// Records are NUL-separated: a status token followed by one path, or two
/// paths for renames and copies. Copies count as an add of the new path and
/// type changes as modifications; unknown codes are skipped.
pub fn parse_name_status_z(out: &str) -> Vec<StatusLine> {
    let mut tokens = out.split('\0').filter(|token| !token.is_empty());
    let mut lines = Vec::new();

    while let Some(code) = tokens.next() {
        let Some(letter) = code.chars().next() else {
            continue;
        };
        match letter {
            'R' | 'C' => {
                let (Some(from), Some(to)) = (tokens.next(), tokens.next()) else {
                    warn!(code, "truncated rename/copy record");
                    break;
                };
                if letter == 'R' {
                    lines.push(StatusLine::Renamed {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                } else {
                    lines.push(StatusLine::Added(to.to_string()));
                }
            }
            'A' | 'M' | 'D' | 'T' => {
                let Some(path) = tokens.next() else {
                    warn!(code, "truncated status record");
                    break;
                };
                let path = path.to_string();
                lines.push(match letter {
                    'A' => StatusLine::Added(path),
                    'D' => StatusLine::Deleted(path),
                    _ => StatusLine::Modified(path),
                });
            }
            _ => {
                warn!(code, "skipping unsupported status code");
                // Every other code carries exactly one path.
                tokens.next();
            }
        }
    }

    lines
}
