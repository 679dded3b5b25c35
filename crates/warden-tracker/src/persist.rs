//! Trace files and the JSONL run log.
//!
//! A trace is written once per run as `<dir>/<run_id>.json`. The run log
//! appends one JSON object per line; payloads arrive already redacted.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, info};

use warden_contracts::{
    error::{WardenError, WardenResult},
    trace::{ExecutionTrace, RunLogEvent},
};
use warden_core::RunLog;

pub fn trace_path(dir: &Path, run_id: &str) -> PathBuf {
    dir.join(format!("{run_id}.json"))
}

/// Write `trace` under `dir`, creating the directory if needed.
///
/// Returns `WardenError::TraceWriteFailed`; callers log and move on.
pub fn write_trace(dir: &Path, trace: &ExecutionTrace) -> WardenResult<PathBuf> {
    let fail = |e: &dyn std::fmt::Display| WardenError::TraceWriteFailed {
        reason: format!("{}: {e}", dir.display()),
    };
    fs::create_dir_all(dir).map_err(|e| fail(&e))?;
    let json = serde_json::to_string_pretty(trace).map_err(|e| fail(&e))?;
    let path = trace_path(dir, &trace.run_id);
    fs::write(&path, json).map_err(|e| fail(&e))?;
    info!(run_id = %trace.run_id, path = %path.display(), "trace written");
    Ok(path)
}

pub fn load_trace(path: &Path) -> WardenResult<ExecutionTrace> {
    let contents = fs::read_to_string(path).map_err(|e| WardenError::Io {
        reason: format!("failed to read trace '{}': {e}", path.display()),
    })?;
    serde_json::from_str(&contents).map_err(|e| WardenError::ConfigError {
        reason: format!("failed to parse trace '{}': {e}", path.display()),
    })
}

/// Append-only run log, one `RunLogEvent` per line.
pub struct JsonlRunLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlRunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLog for JsonlRunLog {
    fn append(&self, event: &RunLogEvent) -> WardenResult<()> {
        let fail = |e: &dyn std::fmt::Display| WardenError::RunLogWriteFailed {
            reason: format!("{}: {e}", self.path.display()),
        };
        let _guard = self.lock.lock().map_err(|e| fail(&e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| fail(&e))?;
        }
        let mut line = serde_json::to_string(event).map_err(|e| fail(&e))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| fail(&e))?;
        file.write_all(line.as_bytes()).map_err(|e| fail(&e))?;
        debug!(kind = ?event.kind, "run log event appended");
        Ok(())
    }
}
