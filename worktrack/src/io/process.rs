//! Bounded, time-limited execution of external probe commands.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::{TrackError, TrackResult};

/// Limits applied to every probe invocation.
#[derive(Debug, Clone, Copy)]
pub struct ProbeLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Captured output of a finished probe command.
#[derive(Debug)]
pub struct ProbeOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
}

impl ProbeOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run `program args..` in `workdir`, draining stdout/stderr on reader threads.
///
/// A spawn failure means the probe cannot be used at all and maps to
/// [`TrackError::ProbeUnavailable`]. A timeout kills the child and maps to
/// [`TrackError::ProbeTimedOut`], which only sinks this one query. A non-zero
/// exit is returned as a normal output for the caller to classify.
#[instrument(skip_all, fields(program = %program, timeout_secs = limits.timeout.as_secs()))]
pub fn run_probe(
    program: &str,
    args: &[&str],
    workdir: &Path,
    limits: ProbeLimits,
) -> TrackResult<ProbeOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let rendered = render_command(program, args);
    debug!(command = %rendered, "spawning probe");
    let mut child = cmd.spawn().map_err(|err| TrackError::ProbeUnavailable {
        reason: format!("spawn {rendered}: {err}"),
    })?;

    let stdout = child.stdout.take().ok_or_else(|| unavailable("stdout was not piped"))?;
    let stderr = child.stderr.take().ok_or_else(|| unavailable("stderr was not piped"))?;
    let limit = limits.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    let waited = child
        .wait_timeout(limits.timeout)
        .map_err(|err| unavailable(&format!("wait for {rendered}: {err}")))?;
    let status = match waited {
        Some(status) => status,
        None => {
            warn!(command = %rendered, timeout_secs = limits.timeout.as_secs(), "probe timed out, killing");
            if let Err(err) = child.kill() {
                warn!(err = %err, "failed to kill probe");
            }
            let _ = child.wait();
            let _ = join_output(stdout_handle);
            let _ = join_output(stderr_handle);
            return Err(TrackError::ProbeTimedOut {
                command: rendered,
                timeout_secs: limits.timeout.as_secs(),
            });
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle)?;
    let (stderr, _) = join_output(stderr_handle)?;
    if stdout_truncated > 0 {
        warn!(command = %rendered, stdout_truncated, "probe output truncated");
    }

    debug!(exit_code = ?status.code(), "probe finished");
    Ok(ProbeOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
    })
}

pub fn render_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program];
    parts.extend_from_slice(args);
    parts.join(" ")
}

fn unavailable(reason: &str) -> TrackError {
    TrackError::ProbeUnavailable {
        reason: reason.to_string(),
    }
}

fn join_output(
    handle: thread::JoinHandle<std::io::Result<(Vec<u8>, usize)>>,
) -> TrackResult<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(unavailable(&format!("read probe output: {err}"))),
        Err(_) => Err(unavailable("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ProbeLimits {
        ProbeLimits {
            timeout: Duration::from_secs(10),
            output_limit_bytes: 1024,
        }
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_probe("worktrack-no-such-binary", &["--version"], temp.path(), limits())
            .expect_err("spawn should fail");
        assert!(err.is_probe_unavailable());
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_is_killed_at_the_deadline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let limits = ProbeLimits {
            timeout: Duration::from_secs(1),
            output_limit_bytes: 1024,
        };
        let started = std::time::Instant::now();
        let err = run_probe("sh", &["-c", "exec sleep 5"], temp.path(), limits)
            .expect_err("should time out");
        assert!(started.elapsed() < Duration::from_secs(4));
        match err {
            TrackError::ProbeTimedOut {
                command,
                timeout_secs,
            } => {
                assert_eq!(command, "sh -c exec sleep 5");
                assert_eq!(timeout_secs, 1);
            }
            other => panic!("expected ProbeTimedOut, got {other:?}"),
        }
    }

    #[test]
    fn read_stream_limited_counts_truncated_bytes() {
        let data = vec![b'x'; 100];
        let (kept, truncated) = read_stream_limited(&data[..], 40).expect("read");
        assert_eq!(kept.len(), 40);
        assert_eq!(truncated, 60);
    }

    #[test]
    fn render_command_joins_args() {
        assert_eq!(
            render_command("git", &["diff", "--name-status"]),
            "git diff --name-status"
        );
    }
}
