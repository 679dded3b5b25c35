//! The tool vocabulary as sent to the provider, and argument validation.
//!
//! Every tool carries a JSON Schema for its arguments. `ToolCatalog` compiles
//! them once with the `jsonschema` crate and checks each call before it
//! reaches approval or dispatch. All violations are collected so the model
//! sees the full failure set in one result.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, warn};

use warden_contracts::{
    message::ToolCall,
    tool::{ToolDefinition, ToolName},
};

/// Description and argument schema for `tool`.
pub fn definition(tool: ToolName) -> ToolDefinition {
    let (description, parameters) = match tool {
        ToolName::ListDir => (
            "List the entries of a workspace directory.",
            object(json!({ "path": string("Directory relative to the workspace root. Defaults to '.'.") }), &[]),
        ),
        ToolName::ReadFile => (
            "Read a text file from the workspace, optionally a line range.",
            object(
                json!({
                    "path": string("File path relative to the workspace root."),
                    "start_line": integer("First line to return, 1-based."),
                    "end_line": integer("Last line to return, inclusive."),
                }),
                &["path"],
            ),
        ),
        ToolName::SearchInFiles => (
            "Case-insensitive plain-text search across workspace files.",
            object(
                json!({
                    "query": string("Text to look for."),
                    "path": string("Directory to search. Defaults to the workspace root."),
                    "max_results": integer("Maximum matching lines to return."),
                }),
                &["query"],
            ),
        ),
        ToolName::SearchCode => (
            "Regular-expression search across source files.",
            object(
                json!({
                    "pattern": string("Regular expression to match against each line."),
                    "path": string("Directory to search. Defaults to the workspace root."),
                    "file_extension": string("Only search files with this extension, e.g. 'rs'."),
                    "max_results": integer("Maximum matching lines to return."),
                }),
                &["pattern"],
            ),
        ),
        ToolName::CheckErrors => (
            "Run the project's configured check command and report diagnostics.",
            object(json!({}), &[]),
        ),
        ToolName::GitStatus => (
            "Show the working tree status.",
            object(json!({}), &[]),
        ),
        ToolName::GitDiff => (
            "Show uncommitted changes.",
            object(
                json!({
                    "path": string("Limit the diff to this path."),
                    "staged": { "type": "boolean", "description": "Show staged changes instead." },
                }),
                &[],
            ),
        ),
        ToolName::GitLog => (
            "Show recent commits, one per line.",
            object(json!({ "max_count": integer("Number of commits. Defaults to 10.") }), &[]),
        ),
        ToolName::FetchUrl => (
            "Fetch a web page over HTTP(S) and return its text.",
            object(json!({ "url": string("Absolute http or https URL.") }), &["url"]),
        ),
        ToolName::SemanticSearch => (
            "Search the repository index for code related to a natural-language query.",
            object(
                json!({
                    "query": string("What to look for."),
                    "limit": integer("Maximum hits to return."),
                }),
                &["query"],
            ),
        ),
        ToolName::WriteFile => (
            "Create or overwrite a workspace file with the given content.",
            object(
                json!({
                    "path": string("File path relative to the workspace root."),
                    "content": { "type": "string", "description": "Complete new file content." },
                }),
                &["path", "content"],
            ),
        ),
        ToolName::ReplaceInFile => (
            "Replace one exact occurrence of a text snippet in a workspace file.",
            object(
                json!({
                    "path": string("File path relative to the workspace root."),
                    "old_text": string("Exact text to replace. Must occur exactly once."),
                    "new_text": { "type": "string", "description": "Replacement text." },
                }),
                &["path", "old_text", "new_text"],
            ),
        ),
        ToolName::RunCommand => (
            "Run a shell command in the workspace root.",
            object(json!({ "command": string("The command line to run.") }), &["command"]),
        ),
        ToolName::GitCommit => (
            "Stage all changes and create a commit.",
            object(json!({ "message": string("Commit message.") }), &["message"]),
        ),
        ToolName::DelegateTask => (
            "Hand a self-contained sub-task to a helper agent and get its final answer back.",
            object(json!({ "task": string("Complete description of the sub-task.") }), &["task"]),
        ),
    };

    ToolDefinition {
        name: tool.as_str().to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn string(description: &str) -> Value {
    json!({ "type": "string", "minLength": 1, "description": description })
}

fn integer(description: &str) -> Value {
    json!({ "type": "integer", "minimum": 1, "description": description })
}

/// Compiled argument validators for the whole vocabulary.
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
    validators: HashMap<ToolName, jsonschema::Validator>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        let definitions: Vec<ToolDefinition> = ToolName::ALL.iter().map(|t| definition(*t)).collect();

        let mut validators = HashMap::new();
        for (tool, def) in ToolName::ALL.iter().zip(&definitions) {
            match jsonschema::validator_for(&def.parameters) {
                Ok(validator) => {
                    validators.insert(*tool, validator);
                }
                // A broken built-in schema leaves that tool unvalidated by
                // the schema rather than unusable.
                Err(e) => warn!(tool = %tool, error = %e, "tool schema failed to compile"),
            }
        }

        Self {
            definitions,
            validators,
        }
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Resolve the tool name and check the arguments against its schema.
    pub fn validate(&self, call: &ToolCall) -> Result<ToolName, String> {
        let tool: ToolName = call.name.parse()?;

        let Some(validator) = self.validators.get(&tool) else {
            return Ok(tool);
        };

        let instance = Value::Object(call.arguments.clone());
        let failures: Vec<String> = validator
            .iter_errors(&instance)
            .map(|error| {
                let at = error.instance_path.to_string();
                if at.is_empty() {
                    error.to_string()
                } else {
                    format!("at {at}: {error}")
                }
            })
            .collect();

        if failures.is_empty() {
            debug!(tool = %tool, call_id = %call.id, "arguments valid");
            Ok(tool)
        } else {
            warn!(tool = %tool, call_id = %call.id, failures = failures.len(), "arguments rejected by schema");
            Err(format!(
                "Invalid arguments for {tool}: {}",
                failures.join("; ")
            ))
        }
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}
