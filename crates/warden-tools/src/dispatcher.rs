//! `WorkspaceTools`: the `ToolDispatcher` behind a real workspace.
//!
//! Every call is checked against the permission policy first. Path targets
//! go through the sandbox, commands through the deny list and safety
//! analysis, URLs through the network rules and the rate limiter. Anything
//! refused comes back as a `ToolResult` error with the reason.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use warden_contracts::{
    message::{ToolCall, ToolResult},
    tool::{ToolDefinition, ToolName},
};
use warden_core::ToolDispatcher;
use warden_policy::PermissionPolicy;
use warden_security::{canonical_root, redact_secrets};

use crate::{
    catalog::ToolCatalog, diff, fetch::Fetcher, fs, git, process, rate_limit::RateLimiter, search,
};

const DEFAULT_SEMANTIC_LIMIT: u64 = 10;
const VERIFY_TAIL_CHARS: usize = 2000;

/// Tool timeouts, limits and project commands. Lives under `[tools]` in
/// `.warden/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub command_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Fetches allowed per rolling window.
    pub fetch_rate_limit: usize,
    pub fetch_rate_window_secs: u64,
    /// Run after every successful write or edit; pass/fail is appended.
    pub verify_command: Option<String>,
    pub verify_timeout_secs: u64,
    /// Backs `check_errors`.
    pub check_command: Option<String>,
    pub max_read_bytes: u64,
    pub max_fetch_bytes: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            fetch_timeout_secs: 20,
            fetch_rate_limit: 10,
            fetch_rate_window_secs: 60,
            verify_command: None,
            verify_timeout_secs: 60,
            check_command: None,
            max_read_bytes: 1024 * 1024,
            max_fetch_bytes: 200_000,
        }
    }
}

/// One hit from a repository search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub score: f32,
    pub snippet: String,
}

/// An external repository index backing `semantic_search`.
pub trait SemanticIndex: Send + Sync {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String>;
}

pub struct WorkspaceTools {
    catalog: ToolCatalog,
    settings: ToolSettings,
    fetch_limiter: RateLimiter,
    fetcher: Result<Fetcher, String>,
    index: Option<Arc<dyn SemanticIndex>>,
}

impl WorkspaceTools {
    pub fn new(settings: ToolSettings) -> Self {
        let fetch_limiter = RateLimiter::new(
            settings.fetch_rate_limit,
            Duration::from_secs(settings.fetch_rate_window_secs),
        );
        let fetcher = Fetcher::new(
            Duration::from_secs(settings.fetch_timeout_secs),
            settings.max_fetch_bytes,
        );
        if let Err(e) = &fetcher {
            warn!(error = %e, "fetch_url unavailable");
        }
        Self {
            catalog: ToolCatalog::new(),
            settings,
            fetch_limiter,
            fetcher,
            index: None,
        }
    }

    pub fn with_index(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    async fn run(&self, tool: ToolName, call: &ToolCall, policy: &PermissionPolicy) -> Result<String, String> {
        let root = canonical_root(policy.workspace_root())?;

        match tool {
            ToolName::ListDir => {
                let shown = call.str_arg("path").unwrap_or(".");
                let dir = policy.check_path(shown)?;
                fs::list_dir(&dir, shown).await
            }
            ToolName::ReadFile => {
                let shown = required(call, "path")?;
                let path = policy.check_path(shown)?;
                fs::read_file(
                    &path,
                    shown,
                    call.u64_arg("start_line"),
                    call.u64_arg("end_line"),
                    self.settings.max_read_bytes,
                )
                .await
            }
            ToolName::SearchInFiles => {
                let query = required(call, "query")?;
                let base = policy.check_path(call.str_arg("path").unwrap_or("."))?;
                search::search_text(&root, &base, query, call.u64_arg("max_results")).await
            }
            ToolName::SearchCode => {
                let pattern = required(call, "pattern")?;
                let base = policy.check_path(call.str_arg("path").unwrap_or("."))?;
                search::search_code(
                    &root,
                    &base,
                    pattern,
                    call.str_arg("file_extension"),
                    call.u64_arg("max_results"),
                )
                .await
            }
            ToolName::CheckErrors => self.check_errors(&root).await,
            ToolName::GitStatus => git::status(&root, &git_scope(policy, None)?).await,
            ToolName::GitDiff => {
                let scope = git_scope(policy, call.str_arg("path"))?;
                git::diff(&root, &scope, call.bool_arg("staged").unwrap_or(false)).await
            }
            ToolName::GitLog => {
                git::log(&root, call.u64_arg("max_count"), &git_scope(policy, None)?).await
            }
            ToolName::FetchUrl => self.fetch(call, policy).await,
            ToolName::SemanticSearch => {
                let query = required(call, "query")?;
                let index = self
                    .index
                    .as_ref()
                    .ok_or("Semantic search index is not available in this session")?;
                let limit = call.u64_arg("limit").unwrap_or(DEFAULT_SEMANTIC_LIMIT) as usize;
                let hits = index.search(query, limit)?;
                Ok(render_hits(&hits))
            }
            ToolName::WriteFile => {
                let shown = required(call, "path")?;
                let content = required_raw(call, "content")?;
                let path = policy.check_write_path(shown)?;
                let out = fs::write_file(&path, shown, content).await?;
                Ok(self.verify(&root, out).await)
            }
            ToolName::ReplaceInFile => {
                let shown = required(call, "path")?;
                let old_text = required(call, "old_text")?;
                let new_text = required_raw(call, "new_text")?;
                let path = policy.check_write_path(shown)?;
                let out = fs::replace_in_file(&path, shown, old_text, new_text).await?;
                Ok(self.verify(&root, out).await)
            }
            ToolName::RunCommand => {
                let command = required(call, "command")?;
                let decision = policy.is_command_allowed(command);
                if let Some(reason) = decision.reason() {
                    return Err(reason.to_string());
                }
                let timeout = Duration::from_secs(self.settings.command_timeout_secs);
                let out = process::run_shell(command, &root, timeout).await?;
                let rendered = redact_secrets(&out.render(timeout));
                if out.success() {
                    Ok(rendered)
                } else {
                    Err(format!("Command failed\n{rendered}"))
                }
            }
            ToolName::GitCommit => git::commit(&root, required(call, "message")?).await,
            ToolName::DelegateTask => Err("delegate_task is handled by the agent loop".to_string()),
        }
    }

    async fn check_errors(&self, root: &Path) -> Result<String, String> {
        let command = self
            .settings
            .check_command
            .as_deref()
            .ok_or("No check command configured; set check_command under [tools]")?;
        let timeout = Duration::from_secs(self.settings.verify_timeout_secs);
        let out = process::run_shell(command, root, timeout).await?;
        let rendered = redact_secrets(&out.render(timeout));
        if out.success() {
            Ok(format!("No errors reported by `{command}`\n{rendered}"))
        } else {
            Ok(format!("`{command}` reported problems:\n{rendered}"))
        }
    }

    async fn fetch(&self, call: &ToolCall, policy: &PermissionPolicy) -> Result<String, String> {
        let raw = required(call, "url")?;
        let url = policy.check_url(raw)?;
        if !self.fetch_limiter.try_acquire() {
            warn!(url = %url, "fetch rate limit reached");
            return Err(format!(
                "Fetch rate limit reached: at most {} requests per {}s",
                self.fetch_limiter.max(),
                self.fetch_limiter.window().as_secs()
            ));
        }
        let fetcher = self.fetcher.as_ref().map_err(|e| e.clone())?;
        fetcher.fetch(url, |next| policy.check_url(next)).await
    }

    /// Append the verify command's verdict to a write result.
    async fn verify(&self, root: &Path, mut output: String) -> String {
        let Some(command) = self.settings.verify_command.as_deref() else {
            return output;
        };
        let timeout = Duration::from_secs(self.settings.verify_timeout_secs);
        match process::run_shell(command, root, timeout).await {
            Ok(out) if out.success() => {
                debug!(command, "post-write verification passed");
                output.push_str(&format!("\n[verify] `{command}` passed"));
            }
            Ok(out) => {
                warn!(command, exit_code = ?out.exit_code, timed_out = out.timed_out, "post-write verification failed");
                let rendered = redact_secrets(&out.render(timeout));
                output.push_str(&format!("\n[verify] `{command}` failed:\n{}", tail(&rendered)));
            }
            Err(e) => output.push_str(&format!("\n[verify] could not run `{command}`: {e}")),
        }
        output
    }

    fn planned_write(
        &self,
        tool: ToolName,
        call: &ToolCall,
        policy: &PermissionPolicy,
    ) -> Option<(String, String, String)> {
        let shown = call.str_arg("path")?;
        let path: PathBuf = policy.check_write_path(shown).ok()?;
        let current = std::fs::read_to_string(&path).unwrap_or_default();
        let planned = match tool {
            ToolName::WriteFile => call.str_arg("content")?.to_string(),
            ToolName::ReplaceInFile => fs::apply_replacement(
                &current,
                shown,
                call.str_arg("old_text")?,
                call.str_arg("new_text")?,
            )
            .ok()?,
            _ => return None,
        };
        Some((shown.to_string(), current, planned))
    }
}

#[async_trait]
impl ToolDispatcher for WorkspaceTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.catalog.definitions().to_vec()
    }

    fn validate(&self, call: &ToolCall) -> Result<ToolName, String> {
        self.catalog.validate(call)
    }

    async fn dispatch(&self, tool: ToolName, call: &ToolCall, policy: &PermissionPolicy) -> ToolResult {
        match self.run(tool, call, policy).await {
            Ok(output) => {
                info!(tool = %tool, call_id = %call.id, bytes = output.len(), "tool succeeded");
                ToolResult::success(&call.id, output)
            }
            Err(reason) => {
                info!(tool = %tool, call_id = %call.id, reason = %reason, "tool failed");
                ToolResult::failure(&call.id, reason)
            }
        }
    }

    fn preview_diff(&self, tool: ToolName, call: &ToolCall, policy: &PermissionPolicy) -> Option<String> {
        if !tool.is_write() {
            return None;
        }
        let (shown, current, planned) = self.planned_write(tool, call, policy)?;
        diff::unified(&shown, &current, &planned)
    }
}

/// Pathspecs for the git read tools: the checked `path` argument when given,
/// otherwise the `allowed_paths` entries, otherwise the whole repository.
fn git_scope(policy: &PermissionPolicy, path: Option<&str>) -> Result<Vec<PathBuf>, String> {
    if let Some(path) = path {
        return Ok(vec![policy.check_path(path)?]);
    }
    if policy.config().allowed_paths.is_empty() {
        return Ok(Vec::new());
    }
    let roots = policy.allowed_roots();
    if roots.is_empty() {
        return Err("None of the allowed paths resolve inside the workspace".to_string());
    }
    Ok(roots)
}

fn required<'a>(call: &'a ToolCall, key: &str) -> Result<&'a str, String> {
    match call.str_arg(key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(format!("Missing required argument '{key}'")),
    }
}

/// Like `required`, but an empty string is a valid value.
fn required_raw<'a>(call: &'a ToolCall, key: &str) -> Result<&'a str, String> {
    call.str_arg(key)
        .ok_or_else(|| format!("Missing required argument '{key}'"))
}

fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No matches found".to_string();
    }
    hits.iter()
        .map(|h| format!("{} ({:.2})\n{}", h.path, h.score, redact_secrets(h.snippet.trim())))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn tail(text: &str) -> &str {
    if text.len() <= VERIFY_TAIL_CHARS {
        return text;
    }
    let mut start = text.len() - VERIFY_TAIL_CHARS;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
