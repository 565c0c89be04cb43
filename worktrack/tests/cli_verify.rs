//! Exit-code tests for the `worktrack` binary.

use std::path::Path;
use std::process::{Command, Output};

use worktrack::exit_codes;
use worktrack::test_support::TestRepo;

fn worktrack(store: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_worktrack"))
        .arg("--store")
        .arg(store)
        .args(args)
        .output()
        .expect("run worktrack")
}

fn code(output: &Output) -> i32 {
    output.status.code().expect("exit code")
}

#[test]
fn verify_exit_code_tracks_scope_match() {
    let repo = TestRepo::new().expect("repo");
    let store = tempfile::tempdir().expect("store");
    let start = repo.head().expect("head");
    repo.write("src/auth/login.ts", "export {};\n");
    repo.stage("src/auth/login.ts").expect("stage");
    let root = repo.path().to_string_lossy().into_owned();

    let in_scope = worktrack(
        store.path(),
        &["verify", "--from", &start, "--root", &root, "--area", "auth"],
    );
    assert_eq!(code(&in_scope), exit_codes::OK);

    let out_of_scope = worktrack(
        store.path(),
        &["verify", "--from", &start, "--root", &root, "--area", "billing"],
    );
    assert_eq!(code(&out_of_scope), exit_codes::SCOPE_MISMATCH);
    let stdout = String::from_utf8_lossy(&out_of_scope.stdout);
    assert!(stdout.contains("src/auth/login.ts"));
    assert!(stdout.contains("1 file(s) modified outside declared scope (billing)"));
}

/// `--from` takes any name git resolves to a commit, not only hex ids.
#[test]
fn diff_accepts_symbolic_start_revisions() {
    let repo = TestRepo::new().expect("repo");
    let store = tempfile::tempdir().expect("store");
    repo.write("src/lib.rs", "pub fn a() {}\n");
    repo.commit_all("feat: lib").expect("commit");
    let root = repo.path().to_string_lossy().into_owned();

    let output = worktrack(store.path(), &["diff", "--from", "HEAD~1", "--root", &root]);
    assert_eq!(code(&output), exit_codes::OK);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(report["completeness"], "complete");
    assert_eq!(report["changes"]["added"][0], "src/lib.rs");

    let unknown = worktrack(
        store.path(),
        &["diff", "--from", "no-such-branch", "--root", &root],
    );
    assert_eq!(code(&unknown), exit_codes::INVALID);
    assert!(String::from_utf8_lossy(&unknown.stderr).contains("no-such-branch"));
}

#[test]
fn diff_without_git_reports_unavailable() {
    let repo = TestRepo::new().expect("repo");
    let store = tempfile::tempdir().expect("store");
    let start = repo.head().expect("head");
    let root = repo.path().to_string_lossy().into_owned();

    let output = worktrack(
        store.path(),
        &[
            "--git",
            "/nonexistent/worktrack-git",
            "diff",
            "--from",
            &start,
            "--root",
            &root,
        ],
    );
    assert_eq!(code(&output), exit_codes::DIFF_UNAVAILABLE);
}

#[test]
fn container_lifecycle_through_the_cli() {
    let repo = TestRepo::new().expect("repo");
    let store = tempfile::tempdir().expect("store");
    let root = repo.path().to_string_lossy().into_owned();

    assert_eq!(code(&worktrack(store.path(), &["init"])), exit_codes::OK);
    assert!(store.path().join("config.toml").exists());

    let created = worktrack(
        store.path(),
        &["container", "create", "phase-1", "--kind", "phase"],
    );
    assert_eq!(code(&created), exit_codes::OK);

    let started = worktrack(
        store.path(),
        &[
            "start",
            "--container",
            "phase-1",
            "--id",
            "u1",
            "--root",
            &root,
        ],
    );
    assert_eq!(code(&started), exit_codes::OK);

    repo.write("README.md", "edited\n");
    let completed = worktrack(
        store.path(),
        &["complete", "--unit", "u1", "--status", "success"],
    );
    assert_eq!(code(&completed), exit_codes::OK);
    let unit: serde_json::Value =
        serde_json::from_slice(&completed.stdout).expect("unit json");
    assert_eq!(unit["status"], "SUCCESS");
    assert_eq!(unit["changes"]["modified"][0], "README.md");

    let recomputed = worktrack(store.path(), &["recompute", "phase-1"]);
    let body: serde_json::Value = serde_json::from_slice(&recomputed.stdout).expect("json");
    assert_eq!(body["status"], "COMPLETED");

    let again = worktrack(
        store.path(),
        &["complete", "--unit", "u1", "--status", "failed"],
    );
    assert_eq!(code(&again), exit_codes::INVALID);
}
