//! Context-window estimation and pruning.
//!
//! History is pruned in groups, never single messages: a user message, an
//! assistant message together with every tool message answering it, or a
//! standalone system message. That keeps each tool message next to the
//! assistant call it answers. Removed groups are replaced by one system
//! message that summarizes them; an earlier summary is folded into it.

use std::collections::BTreeMap;

use tracing::debug;

use warden_contracts::message::{Message, Role};

use crate::config::AgentConfig;

pub const SUMMARY_PREFIX: &str = "[Conversation summary]";

const CHARS_PER_TOKEN: usize = 4;
const MESSAGE_OVERHEAD_TOKENS: usize = 4;
const SNIPPET_CHARS: usize = 160;
const MAX_SUMMARY_ITEMS: usize = 8;

/// Result of one pruning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_messages: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// Approximate token count: about four characters per token over content
/// and serialized tool calls, plus a fixed overhead per message.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(message_tokens).sum()
}

fn message_tokens(message: &Message) -> usize {
    let mut chars = message.content.chars().count();
    for call in &message.tool_calls {
        chars += call.name.len() + call.id.len();
        chars += serde_json::to_string(&call.arguments)
            .map(|s| s.len())
            .unwrap_or(0);
    }
    chars.div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
}

pub fn is_summary(message: &Message) -> bool {
    message.role == Role::System && message.content.starts_with(SUMMARY_PREFIX)
}

/// Prune `history` in place when it exceeds the configured trigger.
///
/// Leading system messages (the system prompt) are always kept, as are the
/// `keep_recent_groups` most recent groups. Returns `None` when nothing was
/// removed.
pub fn prune(history: &mut Vec<Message>, config: &AgentConfig) -> Option<PruneReport> {
    let tokens_before = estimate_tokens(history);
    if tokens_before <= config.prune_trigger_tokens() {
        return None;
    }

    let head_len = history
        .iter()
        .take_while(|m| m.role == Role::System && !is_summary(m))
        .count();

    let mut previous_summary = None;
    let mut body: Vec<Message> = Vec::with_capacity(history.len() - head_len);
    for message in history.drain(head_len..) {
        if is_summary(&message) && previous_summary.is_none() {
            previous_summary = Some(message.content);
        } else {
            body.push(message);
        }
    }

    let groups = group(body);
    let removable = groups.len().saturating_sub(config.keep_recent_groups);

    // Drop oldest groups until the remainder fits the target. The summary's
    // own size is small enough to ignore here.
    let head_tokens = estimate_tokens(history);
    let mut remaining: usize =
        head_tokens + groups.iter().map(|g| estimate_tokens(g)).sum::<usize>();
    let mut cut = 0;
    while cut < removable && remaining > config.prune_target_tokens() {
        remaining -= estimate_tokens(&groups[cut]);
        cut += 1;
    }

    if cut == 0 {
        if let Some(summary) = previous_summary {
            history.push(Message::system(summary));
        }
        history.extend(groups.into_iter().flatten());
        return None;
    }

    let mut groups = groups.into_iter();
    let removed: Vec<Message> = groups.by_ref().take(cut).flatten().collect();
    let removed_messages = removed.len();

    history.push(Message::system(summarize(previous_summary.as_deref(), &removed)));
    history.extend(groups.flatten());

    let tokens_after = estimate_tokens(history);
    debug!(
        removed_messages,
        tokens_before, tokens_after, "context pruned"
    );
    Some(PruneReport {
        removed_messages,
        tokens_before,
        tokens_after,
    })
}

fn group(body: Vec<Message>) -> Vec<Vec<Message>> {
    let mut groups: Vec<Vec<Message>> = Vec::new();
    for message in body {
        let answers_last = message.role == Role::Tool
            && groups.last().is_some_and(|g| g[0].role == Role::Assistant);
        if answers_last {
            if let Some(last) = groups.last_mut() {
                last.push(message);
                continue;
            }
        }
        groups.push(vec![message]);
    }
    groups
}

/// Build the summary text for a run of removed messages.
fn summarize(previous: Option<&str>, removed: &[Message]) -> String {
    let mut asks = Vec::new();
    let mut tools: BTreeMap<&str, usize> = BTreeMap::new();
    let mut results = Vec::new();
    let mut errors = Vec::new();

    for message in removed {
        match message.role {
            Role::User => asks.push(snippet(&message.content)),
            Role::Assistant => {
                for call in &message.tool_calls {
                    *tools.entry(call.name.as_str()).or_default() += 1;
                }
            }
            Role::Tool => {
                if let Some(err) = message.content.strip_prefix("Error: ") {
                    errors.push(snippet(err));
                } else if !message.content.trim().is_empty() {
                    results.push(snippet(&message.content));
                }
            }
            Role::System => {}
        }
    }

    let mut out = String::from(SUMMARY_PREFIX);
    if let Some(previous) = previous {
        let earlier = previous.trim_start_matches(SUMMARY_PREFIX).trim();
        if !earlier.is_empty() {
            out.push_str("\nEarlier:\n");
            out.push_str(earlier);
        }
    }
    push_section(&mut out, "User asked", &asks);
    if !tools.is_empty() {
        let used: Vec<String> = tools
            .iter()
            .map(|(name, n)| if *n > 1 { format!("{name} x{n}") } else { name.to_string() })
            .collect();
        out.push_str("\nTools used: ");
        out.push_str(&used.join(", "));
    }
    push_section(&mut out, "Key results", &results);
    push_section(&mut out, "Errors", &errors);
    out
}

fn push_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n{title}:"));
    // Keep the most recent items; older ones are the least useful.
    let skip = items.len().saturating_sub(MAX_SUMMARY_ITEMS);
    for item in &items[skip..] {
        out.push_str("\n- ");
        out.push_str(item);
    }
}

fn snippet(text: &str) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= SNIPPET_CHARS {
        line
    } else {
        let head: String = line.chars().take(SNIPPET_CHARS).collect();
        format!("{head}...")
    }
}
