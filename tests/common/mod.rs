//! Shared test helpers for cling's multi-workspace scenario tests.
//!
//! All tests use temp directories — no side effects on the real repo.
//! Every invocation passes `--passphrase-from-stdin` so the test binary
//! never blocks on a TTY prompt.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

pub const PASSPHRASE: &str = "correct horse battery staple1";

/// Run `cling` with the given args in `dir`, feeding `PASSPHRASE` on stdin.
pub fn cling_in(dir: &Path, args: &[&str]) -> Output {
    let mut full_args: Vec<&str> = args.to_vec();
    full_args.push("--passphrase-from-stdin");

    let mut child = Command::new(env!("CARGO_BIN_EXE_cling"))
        .args(&full_args)
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cling");

    child.stdin.take().expect("child stdin").write_all(format!("{PASSPHRASE}\n").as_bytes()).expect("write passphrase");

    child.wait_with_output().expect("failed to wait on cling")
}

/// Run `cling` and assert it succeeds. Returns stdout as a string.
pub fn cling_ok(dir: &Path, args: &[&str]) -> String {
    let out = cling_in(dir, args);
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success(), "cling {} failed:\nstdout: {stdout}\nstderr: {stderr}", args.join(" "));
    stdout.to_string()
}

/// Set up a bare repository and one workspace attached at its root.
///
/// Returns `(repo_dir, workspace_dir)`.
pub fn setup_repo_and_workspace() -> (TempDir, TempDir) {
    let repo = TempDir::new().expect("repo temp dir");
    let workspace = TempDir::new().expect("workspace temp dir");

    cling_ok(repo.path(), &["init", "."]);
    cling_ok(workspace.path(), &["attach", &repo.path().display().to_string(), "."]);

    (repo, workspace)
}

/// Attach a second workspace to an already-initialized repository.
pub fn attach_workspace(repo: &Path, path_prefix: Option<&str>) -> TempDir {
    let workspace = TempDir::new().expect("workspace temp dir");
    let repo_str = repo.display().to_string();
    let mut args = vec!["attach", repo_str.as_str(), "."];
    if let Some(prefix) = path_prefix {
        args.push("--path-prefix");
        args.push(prefix);
    }
    cling_ok(workspace.path(), &args);
    workspace
}

pub fn write_file(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, contents).expect("write fixture file");
}

pub fn commit(dir: &Path, message: &str) -> String {
    cling_ok(dir, &["commit", "--message", message])
}

#[allow(dead_code)]
pub fn repo_path_buf(dir: &TempDir) -> PathBuf {
    dir.path().to_path_buf()
}
