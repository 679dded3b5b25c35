//! Loop limits and behavior switches.

use serde::{Deserialize, Serialize};

/// Settings for one orchestrator. Read from the `[agent]` table of
/// `.warden/config.toml`; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Provider calls allowed per turn.
    pub max_iterations: usize,
    /// Provider calls allowed per delegated sub-agent turn.
    pub subagent_max_iterations: usize,
    pub context_window_tokens: usize,
    /// Fraction of the context window that triggers pruning.
    pub prune_threshold: f64,
    /// Fraction of the context window pruning aims for.
    pub prune_target: f64,
    /// Most recent message groups that pruning never touches.
    pub keep_recent_groups: usize,
    /// Skip the prompt for low-risk actions that are not escalated.
    pub auto_approve: bool,
    pub streaming: bool,
    pub max_tool_output_chars: usize,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            subagent_max_iterations: 5,
            context_window_tokens: 32_000,
            prune_threshold: 0.80,
            prune_target: 0.50,
            keep_recent_groups: 4,
            auto_approve: false,
            streaming: true,
            max_tool_output_chars: 20_000,
            system_prompt: None,
        }
    }
}

impl AgentConfig {
    pub(crate) fn prune_trigger_tokens(&self) -> usize {
        (self.context_window_tokens as f64 * self.prune_threshold) as usize
    }

    pub(crate) fn prune_target_tokens(&self) -> usize {
        (self.context_window_tokens as f64 * self.prune_target) as usize
    }
}
