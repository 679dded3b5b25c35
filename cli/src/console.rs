//! Terminal approval prompt and display.

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use warden_contracts::{
    action::ProposedAction,
    error::{WardenError, WardenResult},
    message::Role,
};
use warden_core::ApprovalHandler;

const MAX_SHOWN_OUTPUT: usize = 2000;

pub struct ConsoleApprovals {
    /// Answer every prompt with yes without reading stdin.
    assume_yes: bool,
}

impl ConsoleApprovals {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

/// The text shown above the `[y/N]` prompt.
pub fn describe_action(action: &ProposedAction, diff: Option<&str>) -> String {
    let mut out = format!("{} [risk: {}]", action.description, action.risk);
    if action.escalated {
        out.push_str("\n  approval required: untrusted content was seen earlier in this session");
    }
    if let Some(diff) = diff {
        out.push('\n');
        out.push_str(diff.trim_end());
    }
    out
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_SHOWN_OUTPUT {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_SHOWN_OUTPUT).collect();
        format!("{head}\n...")
    }
}

#[async_trait]
impl ApprovalHandler for ConsoleApprovals {
    async fn request_approval(
        &self,
        action: &ProposedAction,
        diff: Option<&str>,
    ) -> WardenResult<bool> {
        println!("\n? {}", describe_action(action, diff));
        if self.assume_yes {
            println!("  approve? [y/N] y (--yes)");
            info!(tool = %action.tool, "approved by --yes");
            return Ok(true);
        }

        print!("  approve? [y/N] ");
        std::io::stdout().flush().map_err(|e| WardenError::ApprovalFailed {
            reason: format!("failed to write prompt: {e}"),
        })?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await
            .map_err(|e| WardenError::ApprovalFailed {
                reason: format!("failed to read answer: {e}"),
            })?;
        Ok(is_yes(&answer))
    }

    fn show_message(&self, role: Role, text: &str) {
        match role {
            Role::Assistant => println!("\n{text}"),
            Role::System => eprintln!("[warden] {text}"),
            other => println!("[{}] {text}", other.as_str()),
        }
    }

    fn show_tool_result(&self, tool: &str, output: &str, error: Option<&str>) {
        match error {
            Some(err) => println!("  {tool}: error: {err}"),
            None => println!("  {tool}:\n{}", clip(output)),
        }
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn stream_token(&self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn stream_end(&self) {
        println!();
    }
}
