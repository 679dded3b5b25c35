//! # warden-tracker
//!
//! Deterministic execution traces for the WARDEN runtime.
//!
//! ## Overview
//!
//! [`ExecutionTracker`] observes the orchestration loop at every checkpoint
//! (user message, assistant response, dispatched tool call, tool result) and
//! records a SHA-256 fingerprint of the whole message history. Two runs are
//! proven identical when their fingerprints agree step for step; otherwise
//! [`compare`] names the first step where they split.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_tracker::{compare, write_trace, ExecutionTracker};
//!
//! let tracker = Arc::new(ExecutionTracker::new("scripted", "scripted"));
//! let mut agent = Orchestrator::new(provider, approvals, tools, policy, config)
//!     .with_observer(tracker.clone());
//! agent.run_turn("summarize src/lib.rs").await?;
//!
//! let trace = tracker.finalize();
//! write_trace(Path::new(".warden/traces"), &trace)?;
//! assert!(compare(&trace, &previous).is_equivalent());
//! ```

pub mod compare;
pub mod fingerprint;
pub mod persist;
pub mod tracker;

pub use compare::{compare, Divergence, TraceComparison};
pub use fingerprint::fingerprint;
pub use persist::{load_trace, trace_path, write_trace, JsonlRunLog};
pub use tracker::ExecutionTracker;

// ── Tests ─────────────────────────────────────────────────────────────────────
