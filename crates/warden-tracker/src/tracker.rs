//! `ExecutionTracker`, the reference `ExecutionObserver`.
//!
//! Snapshots are kept in a `Vec` behind a `Mutex` so the tracker can be
//! shared with the orchestrator as an `Arc<dyn ExecutionObserver>` and read
//! from elsewhere. Readers always see a prefix of the final trace.

use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_contracts::{
    message::Message,
    trace::{ExecutionTrace, StateSnapshot, Trigger},
};
use warden_core::{context::estimate_tokens, ExecutionObserver};

use crate::fingerprint::fingerprint;

pub struct ExecutionTracker {
    run_id: String,
    provider: String,
    model: String,
    snapshots: Mutex<Vec<StateSnapshot>>,
}

impl ExecutionTracker {
    /// A tracker with a fresh v4 run id.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_run_id(Uuid::new_v4().to_string(), provider, model)
    }

    pub fn with_run_id(
        run_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            provider: provider.into(),
            model: model.into(),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Snapshots recorded so far.
    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Seal the snapshots recorded so far into a trace. The tracker keeps
    /// recording afterwards; a later call returns a longer trace.
    pub fn finalize(&self) -> ExecutionTrace {
        let snapshots = self.snapshots();
        let final_fingerprint = snapshots
            .last()
            .map(|s| s.fingerprint.clone())
            .unwrap_or_default();
        info!(
            run_id = %self.run_id,
            snapshot_count = snapshots.len(),
            final_fingerprint = %final_fingerprint,
            "execution trace finalized"
        );
        ExecutionTrace {
            run_id: self.run_id.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            snapshots,
            final_fingerprint,
        }
    }
}

impl ExecutionObserver for ExecutionTracker {
    fn checkpoint(&self, messages: &[Message], trigger: Trigger, tool_name: Option<&str>) {
        let fingerprint = fingerprint(messages);
        let approx_tokens = estimate_tokens(messages);

        let Ok(mut snapshots) = self.snapshots.lock() else {
            warn!(run_id = %self.run_id, %trigger, "tracker lock poisoned; snapshot dropped");
            return;
        };
        let step = snapshots.len() as u64;
        debug!(step, %trigger, tool = ?tool_name, fingerprint = %fingerprint, "snapshot");
        snapshots.push(StateSnapshot {
            step,
            fingerprint,
            timestamp: Utc::now(),
            trigger,
            tool_name: tool_name.map(str::to_string),
            message_count: messages.len(),
            approx_tokens,
        });
    }
}
