//! Child processes with a timeout and bounded, structured output.

use std::{path::Path, process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::{debug, warn};

/// Captured output of one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Stdout and stderr joined for display, with a status line on failure.
    pub fn render(&self, timeout: Duration) -> String {
        let mut out = String::new();
        if !self.stdout.is_empty() {
            out.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("[stderr]\n");
            out.push_str(&self.stderr);
        }
        if self.timed_out {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("[timed out after {}s]", timeout.as_secs()));
        } else if let Some(code) = self.exit_code.filter(|c| *c != 0) {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("[exit code {code}]"));
        }
        if out.is_empty() {
            out.push_str("(no output)");
        }
        out
    }
}

/// Run `command` through `sh -c` in `cwd`.
pub async fn run_shell(command: &str, cwd: &Path, timeout: Duration) -> Result<ProcessOutput, String> {
    run_program("sh", &["-c", command], cwd, timeout).await
}

/// Run `program` with `args` in `cwd`, killing it when `timeout` elapses.
pub async fn run_program(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<ProcessOutput, String> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program, args = ?args, "spawning child process");
    let child = cmd
        .spawn()
        .map_err(|e| format!("Failed to start '{program}': {e}"))?;

    // Dropping the pending future drops the child, which kills it.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let result = ProcessOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                timed_out: false,
            };
            debug!(program, exit_code = ?result.exit_code, "child process finished");
            Ok(result)
        }
        Ok(Err(e)) => Err(format!("Failed to wait for '{program}': {e}")),
        Err(_) => {
            warn!(program, timeout_secs = timeout.as_secs(), "child process timed out, killed");
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                timed_out: true,
            })
        }
    }
}
