//! The fixed tool vocabulary.
//!
//! Every tool the model may call is named here. The orchestration loop uses
//! the read-only classification to decide whether a batch may run
//! concurrently, and the permission policy uses it to derive approval.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ListDir,
    ReadFile,
    SearchInFiles,
    SearchCode,
    CheckErrors,
    GitStatus,
    GitDiff,
    GitLog,
    FetchUrl,
    SemanticSearch,
    WriteFile,
    ReplaceInFile,
    RunCommand,
    GitCommit,
    DelegateTask,
}

impl ToolName {
    pub const ALL: [ToolName; 15] = [
        ToolName::ListDir,
        ToolName::ReadFile,
        ToolName::SearchInFiles,
        ToolName::SearchCode,
        ToolName::CheckErrors,
        ToolName::GitStatus,
        ToolName::GitDiff,
        ToolName::GitLog,
        ToolName::FetchUrl,
        ToolName::SemanticSearch,
        ToolName::WriteFile,
        ToolName::ReplaceInFile,
        ToolName::RunCommand,
        ToolName::GitCommit,
        ToolName::DelegateTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ListDir => "list_dir",
            ToolName::ReadFile => "read_file",
            ToolName::SearchInFiles => "search_in_files",
            ToolName::SearchCode => "search_code",
            ToolName::CheckErrors => "check_errors",
            ToolName::GitStatus => "git_status",
            ToolName::GitDiff => "git_diff",
            ToolName::GitLog => "git_log",
            ToolName::FetchUrl => "fetch_url",
            ToolName::SemanticSearch => "semantic_search",
            ToolName::WriteFile => "write_file",
            ToolName::ReplaceInFile => "replace_in_file",
            ToolName::RunCommand => "run_command",
            ToolName::GitCommit => "git_commit",
            ToolName::DelegateTask => "delegate_task",
        }
    }

    /// Read-only tools have no ordering-sensitive side effects.
    pub fn is_read_only(&self) -> bool {
        !self.is_mutating()
    }

    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ToolName::WriteFile
                | ToolName::ReplaceInFile
                | ToolName::RunCommand
                | ToolName::GitCommit
                | ToolName::DelegateTask
        )
    }

    /// Tools whose approval bar is raised once untrusted content was seen.
    pub fn is_high_impact(&self) -> bool {
        matches!(
            self,
            ToolName::RunCommand
                | ToolName::WriteFile
                | ToolName::ReplaceInFile
                | ToolName::GitCommit
                | ToolName::FetchUrl
        )
    }

    pub fn is_write(&self) -> bool {
        matches!(self, ToolName::WriteFile | ToolName::ReplaceInFile)
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown tool: {s}"))
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool as advertised to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the `arguments` object.
    pub parameters: Value,
}

/// How the provider may use tools on a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    Auto,
    None,
    Required,
}
