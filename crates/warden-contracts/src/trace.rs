//! Execution-trace records and run-log events.
//!
//! `StateSnapshot` is what the execution tracker records at every checkpoint.
//! `ExecutionTrace` is the sealed document written when a run ends.
//! `RunLogEvent` is one entry handed to the persisted run log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The checkpoint that caused a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    UserMessage,
    ToolCall,
    ToolResult,
    AssistantResponse,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Trigger::UserMessage => "user_message",
            Trigger::ToolCall => "tool_call",
            Trigger::ToolResult => "tool_result",
            Trigger::AssistantResponse => "assistant_response",
        })
    }
}

/// A point-in-time fingerprint of the conversation.
///
/// Snapshots are append-only and never revised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Monotonically increasing position in the trace, starting at 0.
    pub step: u64,
    /// SHA-256 (hex) over the canonical message list.
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub message_count: usize,
    pub approx_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub run_id: String,
    pub provider: String,
    pub model: String,
    pub snapshots: Vec<StateSnapshot>,
    /// Fingerprint of the last snapshot; empty when no snapshot was taken.
    pub final_fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLogKind {
    ToolCall,
    ToolResult,
    ApprovalResponse,
}

/// One event for the persisted run log. The payload is redacted before the
/// event is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEvent {
    pub kind: RunLogKind,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}
