//! Construction of `ProposedAction` values.
//!
//! Approval and risk are derived here, once, from the policy and the session
//! taint state. The orchestrator only reads the result.

use tracing::debug;

use warden_contracts::{
    action::{ProposedAction, RiskLevel},
    message::ToolCall,
    tool::ToolName,
};
use warden_security::analyze_command;

use crate::engine::PermissionPolicy;

const DESCRIPTION_ARG_CHARS: usize = 120;

impl PermissionPolicy {
    /// Build the action the operator would be asked about.
    ///
    /// When the session is tainted, high-impact tools always require approval
    /// and are marked escalated so auto-approve cannot skip them.
    pub fn propose(&self, tool: ToolName, call: &ToolCall, tainted: bool) -> ProposedAction {
        let mut requires_approval = self.requires_approval(tool, call);
        let escalated = tainted && tool.is_high_impact();
        if escalated {
            requires_approval = true;
            debug!(tool = %tool, call_id = %call.id, "approval escalated by session taint");
        }

        ProposedAction {
            tool: tool.as_str().to_string(),
            arguments: call.arguments.clone(),
            description: describe(tool, call),
            risk: assess_risk(tool, call),
            requires_approval,
            escalated,
        }
    }
}

/// Operator-facing risk of a call.
pub fn assess_risk(tool: ToolName, call: &ToolCall) -> RiskLevel {
    match tool {
        ToolName::RunCommand => {
            analyze_command(call.str_arg("command").unwrap_or_default())
                .severity
                .to_risk()
        }
        ToolName::GitCommit => RiskLevel::High,
        ToolName::WriteFile
        | ToolName::ReplaceInFile
        | ToolName::DelegateTask
        | ToolName::FetchUrl => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// One-line summary of what the call will do.
pub fn describe(tool: ToolName, call: &ToolCall) -> String {
    let arg = |key: &str| clip(call.str_arg(key).unwrap_or("?"));
    match tool {
        ToolName::ListDir => format!("List directory: {}", clip(call.str_arg("path").unwrap_or("."))),
        ToolName::ReadFile => format!("Read file: {}", arg("path")),
        ToolName::SearchInFiles => format!("Search files for: {}", arg("query")),
        ToolName::SearchCode => format!("Search code for: {}", arg("pattern")),
        ToolName::CheckErrors => "Run project checks".to_string(),
        ToolName::GitStatus => "Show git status".to_string(),
        ToolName::GitDiff => "Show git diff".to_string(),
        ToolName::GitLog => "Show git log".to_string(),
        ToolName::FetchUrl => format!("Fetch URL: {}", arg("url")),
        ToolName::SemanticSearch => format!("Semantic search: {}", arg("query")),
        ToolName::WriteFile => {
            let bytes = call.str_arg("content").map(str::len).unwrap_or(0);
            format!("Write file: {} ({bytes} bytes)", arg("path"))
        }
        ToolName::ReplaceInFile => format!("Edit file: {}", arg("path")),
        ToolName::RunCommand => format!("Run command: {}", arg("command")),
        ToolName::GitCommit => format!("Commit changes: {}", arg("message")),
        ToolName::DelegateTask => format!("Delegate task: {}", arg("task")),
    }
}

fn clip(s: &str) -> String {
    if s.chars().count() <= DESCRIPTION_ARG_CHARS {
        s.to_string()
    } else {
        let head: String = s.chars().take(DESCRIPTION_ARG_CHARS).collect();
        format!("{head}...")
    }
}
