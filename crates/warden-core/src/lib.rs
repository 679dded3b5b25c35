//! # warden-core
//!
//! The tool-call orchestration loop for WARDEN agents.
//!
//! This crate provides:
//! - The capability traits (`Provider`, `ApprovalHandler`, `ToolDispatcher`,
//!   `ExecutionObserver`, `RunLog`)
//! - The `Orchestrator` that drives a conversation through them in trust order
//! - Context-window pruning and the typed event sink
//! - `ScriptedProvider`, a deterministic provider for tests and replay
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_core::{AgentConfig, Orchestrator};
//!
//! let mut agent = Orchestrator::new(provider, approvals, tools, policy, AgentConfig::default());
//! let outcome = agent.run_turn("fix the failing test").await?;
//! ```

pub mod config;
pub mod context;
pub mod events;
pub mod orchestrator;
pub mod scripted;
pub mod traits;

pub use config::AgentConfig;
pub use events::{AgentEvent, EventSink};
pub use orchestrator::{Orchestrator, TurnOutcome, TurnStatus};
pub use scripted::ScriptedProvider;
pub use traits::{
    ApprovalHandler, ExecutionObserver, Provider, ProviderResponse, RunLog, ToolDispatcher,
};
