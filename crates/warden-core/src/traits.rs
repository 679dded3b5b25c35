//! Capability traits for the WARDEN orchestration loop.
//!
//! These traits define the trust boundary around the loop:
//!
//! - `Provider`          : untrusted model; its tool calls are only requests
//! - `ApprovalHandler`   : the operator, plus the display the loop writes to
//! - `ToolDispatcher`    : trusted executor of validated tool calls
//! - `ExecutionObserver` : read-only tracker fed at every checkpoint
//! - `RunLog`            : write-only sink for the persisted run log
//!
//! The orchestrator wires them together. A tool call never reaches
//! `ToolDispatcher::dispatch()` until it has been validated, classified by the
//! permission policy, and (when required) approved.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use warden_contracts::{
    action::ProposedAction,
    error::WardenResult,
    message::{Message, Role, ToolCall, ToolResult},
    tool::{ToolDefinition, ToolMode, ToolName},
    trace::{RunLogEvent, Trigger},
};
use warden_policy::PermissionPolicy;

/// What the model produced for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ProviderResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls,
        }
    }
}

/// A language-model backend.
///
/// Implementations are **untrusted**: nothing they return is acted on
/// without passing the policy gate. Any failure surfaces as a single
/// `WardenError::ProviderFailed`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Label recorded in execution traces.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        mode: ToolMode,
    ) -> WardenResult<ProviderResponse>;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Like `generate`, forwarding partial text to `on_token` as it arrives.
    /// The returned response still carries the complete text.
    async fn generate_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        mode: ToolMode,
        on_token: &(dyn for<'t> Fn(&'t str) + Send + Sync),
    ) -> WardenResult<ProviderResponse> {
        let response = self.generate(messages, tools, mode).await?;
        if !response.text.is_empty() {
            on_token(&response.text);
        }
        Ok(response)
    }
}

/// The operator and the surface the loop reports to.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Ask whether `action` may proceed. `diff` is a unified-diff preview for
    /// write and edit tools.
    ///
    /// An `Err` is treated as a denial of this one action.
    async fn request_approval(
        &self,
        action: &ProposedAction,
        diff: Option<&str>,
    ) -> WardenResult<bool>;

    fn show_message(&self, role: Role, text: &str);

    fn show_tool_result(&self, tool: &str, output: &str, error: Option<&str>);

    fn supports_streaming(&self) -> bool {
        false
    }

    fn stream_token(&self, _text: &str) {}

    fn stream_end(&self) {}
}

/// Executes tool calls against the workspace.
///
/// Policy violations are returned as `ToolResult` errors, never raised.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Definitions (with JSON Schemas) sent to the provider.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Resolve the tool name and check the arguments against its schema.
    /// Returns a short reason on failure.
    fn validate(&self, call: &ToolCall) -> Result<ToolName, String>;

    /// Run a validated call. `delegate_task` is handled by the orchestrator
    /// and never reaches this method.
    async fn dispatch(&self, tool: ToolName, call: &ToolCall, policy: &PermissionPolicy)
        -> ToolResult;

    /// Unified diff of what a write or edit would change, for the approval
    /// prompt. `None` when there is nothing to preview.
    fn preview_diff(
        &self,
        _tool: ToolName,
        _call: &ToolCall,
        _policy: &PermissionPolicy,
    ) -> Option<String> {
        None
    }
}

/// Read-only observer of the message history.
///
/// Called at every checkpoint with the full history. Implementations must
/// not fail the loop; I/O problems are theirs to log.
pub trait ExecutionObserver: Send + Sync {
    fn checkpoint(&self, messages: &[Message], trigger: Trigger, tool_name: Option<&str>);
}

/// Append-only persisted run log.
///
/// The orchestrator logs and ignores write failures.
pub trait RunLog: Send + Sync {
    fn append(&self, event: &RunLogEvent) -> WardenResult<()>;
}
