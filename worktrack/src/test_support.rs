//! Test-only helpers: scripted probes, throwaway git repositories, and
//! record builders.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::core::types::{SnapshotDescriptor, StatusLine, UnitStatus};
use crate::error::{TrackError, TrackResult};
use crate::io::events::{EventSink, TrackerEvent};
use crate::io::git::{DiffRange, VcsProbe};
use crate::model::{UnitMetrics, WorkUnit};

/// Probe failure a [`ScriptedProbe`] can replay on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Unavailable,
    Failed,
    InvalidRevision,
    TimedOut,
}

impl ScriptedFailure {
    fn into_error(self) -> TrackError {
        match self {
            Self::Unavailable => TrackError::ProbeUnavailable {
                reason: "scripted: probe unavailable".to_string(),
            },
            Self::Failed => TrackError::ProbeFailed {
                command: "scripted".to_string(),
                stderr: "scripted failure".to_string(),
            },
            Self::InvalidRevision => TrackError::InvalidRevision {
                revision: "scripted".to_string(),
            },
            Self::TimedOut => TrackError::ProbeTimedOut {
                command: "scripted".to_string(),
                timeout_secs: 1,
            },
        }
    }
}

/// Which diff a scripted response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSource {
    Committed,
    Staged,
    Unstaged,
}

type Scripted<T> = Result<T, ScriptedFailure>;

/// [`VcsProbe`] that replays fixed answers.
///
/// Unscripted diffs answer with an empty list.
#[derive(Debug)]
pub struct ScriptedProbe {
    tracked: Scripted<bool>,
    revision: Mutex<Scripted<String>>,
    committed: Scripted<Vec<StatusLine>>,
    staged: Scripted<Vec<StatusLine>>,
    unstaged: Scripted<Vec<StatusLine>>,
    diff_calls: AtomicUsize,
}

impl ScriptedProbe {
    /// A tracked tree whose current revision is `revision`.
    pub fn tracked_at(revision: &str) -> Self {
        Self {
            tracked: Ok(true),
            revision: Mutex::new(Ok(revision.to_string())),
            committed: Ok(Vec::new()),
            staged: Ok(Vec::new()),
            unstaged: Ok(Vec::new()),
            diff_calls: AtomicUsize::new(0),
        }
    }

    /// A tree outside version control.
    pub fn untracked() -> Self {
        Self {
            tracked: Ok(false),
            revision: Mutex::new(Err(ScriptedFailure::Failed)),
            ..Self::tracked_at("0000")
        }
    }

    pub fn with_tracked_failure(mut self, failure: ScriptedFailure) -> Self {
        self.tracked = Err(failure);
        self
    }

    pub fn with_revision_failure(self, failure: ScriptedFailure) -> Self {
        self.set_revision(Err(failure));
        self
    }

    pub fn with_diff(mut self, source: DiffSource, response: Scripted<Vec<StatusLine>>) -> Self {
        match source {
            DiffSource::Committed => self.committed = response,
            DiffSource::Staged => self.staged = response,
            DiffSource::Unstaged => self.unstaged = response,
        }
        self
    }

    /// Simulate a commit landing after the probe was built.
    pub fn advance_to(&self, revision: &str) {
        self.set_revision(Ok(revision.to_string()));
    }

    /// Number of `diff_by_status` calls seen so far.
    pub fn diff_calls(&self) -> usize {
        self.diff_calls.load(Ordering::SeqCst)
    }

    fn set_revision(&self, revision: Scripted<String>) {
        let mut guard = self.revision.lock().unwrap_or_else(|p| p.into_inner());
        *guard = revision;
    }
}

impl VcsProbe for ScriptedProbe {
    fn is_tracked(&self, _root: &Path) -> TrackResult<bool> {
        self.tracked.map_err(ScriptedFailure::into_error)
    }

    fn current_revision(&self, _root: &Path) -> TrackResult<String> {
        let guard = self.revision.lock().unwrap_or_else(|p| p.into_inner());
        guard.clone().map_err(ScriptedFailure::into_error)
    }

    fn diff_by_status(&self, _root: &Path, range: DiffRange<'_>) -> TrackResult<Vec<StatusLine>> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        let response = match range {
            DiffRange::Revisions { .. } => &self.committed,
            DiffRange::Staged => &self.staged,
            DiffRange::Unstaged => &self.unstaged,
        };
        response.clone().map_err(ScriptedFailure::into_error)
    }
}

/// Event sink that keeps everything it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TrackerEvent>>,
    fail: bool,
}

impl RecordingSink {
    /// A sink whose every publish errors (after recording the event).
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<TrackerEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &TrackerEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
        if self.fail {
            bail!("scripted sink failure");
        }
        Ok(())
    }
}

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, contents).expect("write file");
}

/// Throwaway git repository with one initial commit.
pub struct TestRepo {
    temp: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let repo = Self { temp };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        write_file(repo.path(), "README.md", "hi\n");
        repo.commit_all("chore: init")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().to_path_buf()
    }

    pub fn write(&self, rel: &str, contents: &str) {
        write_file(self.path(), rel, contents);
    }

    pub fn stage(&self, rel: &str) -> Result<()> {
        self.git(&["add", "--", rel])
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "-m", message])
    }

    pub fn head(&self) -> Result<String> {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.path())
            .output()
            .context("git rev-parse")?;
        if !output.status.success() {
            bail!("git rev-parse HEAD failed");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn git(&self, args: &[&str]) -> Result<()> {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .status()
            .with_context(|| format!("git {}", args.join(" ")))?;
        if !status.success() {
            bail!("git {} exited with {status}", args.join(" "));
        }
        Ok(())
    }
}

/// In-progress unit with deterministic defaults.
pub fn unit(id: &str, container_id: &str) -> WorkUnit {
    WorkUnit {
        id: id.to_string(),
        container_id: container_id.to_string(),
        parent_unit_id: None,
        root: "/repo".to_string(),
        declared_areas: Vec::new(),
        status: UnitStatus::InProgress,
        snapshot: SnapshotDescriptor::Versioned {
            id: "abc123".to_string(),
        },
        started_at_ms: 1_000,
        completed_at_ms: None,
        changes: None,
        scope: None,
        diff: None,
        diff_gaps: Vec::new(),
        metrics: UnitMetrics::default(),
    }
}

/// Metrics shorthand for completion requests.
pub fn metrics(duration_ms: u64, input_tokens: u64, output_tokens: u64) -> UnitMetrics {
    UnitMetrics {
        duration_ms,
        input_tokens,
        output_tokens,
    }
}
