//! A small wrapper around `git` subprocess calls in the workspace root.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info};

use crate::process::{run_program, ProcessOutput};

const GIT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LOG_COUNT: u64 = 10;
const MAX_LOG_COUNT: u64 = 200;

async fn git(root: &Path, args: &[&str]) -> Result<String, String> {
    debug!(args = ?args, "running git");
    let out: ProcessOutput = run_program("git", args, root, GIT_TIMEOUT).await?;
    if out.timed_out {
        return Err(format!("git {} timed out", args.first().copied().unwrap_or("")));
    }
    if !out.success() {
        let detail = if out.stderr.trim().is_empty() {
            out.stdout.trim()
        } else {
            out.stderr.trim()
        };
        return Err(format!(
            "git {} failed: {detail}",
            args.first().copied().unwrap_or("")
        ));
    }
    Ok(out.stdout)
}

fn or_placeholder(text: String, placeholder: &str) -> String {
    if text.trim().is_empty() {
        placeholder.to_string()
    } else {
        text
    }
}

/// Append `-- <paths>` when the call is scoped. Paths must already be
/// checked against the sandbox.
fn with_pathspecs<'a>(mut args: Vec<&'a str>, scope: &'a [String]) -> Vec<&'a str> {
    if !scope.is_empty() {
        args.push("--");
        args.extend(scope.iter().map(String::as_str));
    }
    args
}

fn pathspecs(scope: &[PathBuf]) -> Vec<String> {
    scope.iter().map(|p| p.to_string_lossy().into_owned()).collect()
}

pub async fn status(root: &Path, scope: &[PathBuf]) -> Result<String, String> {
    let specs = pathspecs(scope);
    git(root, &with_pathspecs(vec!["status", "--short", "--branch"], &specs)).await
}

pub async fn diff(root: &Path, scope: &[PathBuf], staged: bool) -> Result<String, String> {
    let specs = pathspecs(scope);
    let mut args = vec!["diff"];
    if staged {
        args.push("--staged");
    }
    git(root, &with_pathspecs(args, &specs))
        .await
        .map(|d| or_placeholder(d, "(no changes)"))
}

pub async fn log(root: &Path, max_count: Option<u64>, scope: &[PathBuf]) -> Result<String, String> {
    let count = max_count.unwrap_or(DEFAULT_LOG_COUNT).clamp(1, MAX_LOG_COUNT).to_string();
    let specs = pathspecs(scope);
    git(root, &with_pathspecs(vec!["log", "--oneline", "-n", count.as_str()], &specs))
        .await
        .map(|l| or_placeholder(l, "(no commits)"))
}

/// Stage everything and commit.
pub async fn commit(root: &Path, message: &str) -> Result<String, String> {
    git(root, &["add", "-A"]).await?;
    let out = git(root, &["commit", "-m", message]).await?;
    info!(message_len = message.len(), "commit created");
    Ok(out)
}
