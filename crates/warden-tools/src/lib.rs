//! # warden-tools
//!
//! The workspace tools behind the WARDEN agent loop.
//!
//! This crate provides [`WorkspaceTools`], which implements
//! [`warden_core::ToolDispatcher`]. Each call is handled in two phases:
//!
//! 1. **Validation**: the tool name is resolved and the arguments are checked
//!    against the tool's JSON Schema via the `jsonschema` crate.
//! 2. **Execution**: the permission policy is consulted (sandbox, write gate,
//!    command gate, network gate, rate limit) and the tool runs against the
//!    filesystem, `git`, a child process, or the network.
//!
//! Policy violations are returned as `ToolResult` errors, never raised.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use warden_tools::{ToolSettings, WorkspaceTools};
//!
//! let tools = WorkspaceTools::new(ToolSettings::default());
//! let tool = tools.validate(&call)?;
//! let result = tools.dispatch(tool, &call, &policy).await;
//! ```

pub mod catalog;
pub mod diff;
pub mod dispatcher;
pub mod fetch;
pub mod fs;
pub mod git;
pub mod process;
pub mod rate_limit;
pub mod search;

pub use catalog::ToolCatalog;
pub use dispatcher::{SearchHit, SemanticIndex, ToolSettings, WorkspaceTools};
pub use process::ProcessOutput;
pub use rate_limit::RateLimiter;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use serde_json::{json, Value};
    use tempfile::TempDir;
    use warden_contracts::{
        message::{ToolCall, ToolResult},
        tool::ToolName,
    };
    use warden_core::ToolDispatcher;
    use warden_policy::{PermissionPolicy, PermissionsConfig};

    use crate::{SearchHit, SemanticIndex, ToolSettings, WorkspaceTools};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join(".warden")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {\n    println!(\"hi\");\n}\n").unwrap();
        dir
    }

    fn policy(dir: &TempDir, edit: impl FnOnce(&mut PermissionsConfig)) -> PermissionPolicy {
        let mut config = PermissionsConfig::for_workspace(dir.path());
        edit(&mut config);
        PermissionPolicy::new(config)
    }

    fn permissive(dir: &TempDir) -> PermissionPolicy {
        policy(dir, |c| {
            c.write_file = true;
            c.run_command = true;
            c.network_access = true;
        })
    }

    async fn call(
        tools: &WorkspaceTools,
        policy: &PermissionPolicy,
        name: &str,
        args: Value,
    ) -> ToolResult {
        let call = ToolCall::new("t1", name, args);
        let tool = tools.validate(&call).unwrap();
        tools.dispatch(tool, &call, policy).await
    }

    fn error_of(result: &ToolResult) -> &str {
        match &result.error {
            Some(e) => e,
            None => panic!("expected an error, got output {:?}", result.output),
        }
    }

    // ── 1. definitions ───────────────────────────────────────────────────────

    #[test]
    fn test_definitions_cover_vocabulary() {
        let tools = WorkspaceTools::new(ToolSettings::default());
        let names: Vec<String> = tools.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 15);
        for tool in ToolName::ALL {
            assert!(names.iter().any(|n| n == tool.as_str()), "{tool} missing");
        }
    }

    // ── 2. filesystem ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_read_inside_workspace() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(&tools, &policy(&dir, |_| {}), "read_file", json!({"path": "src/main.rs"})).await;
        assert!(result.output.contains("println!"));
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn test_read_escape_rejected() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(&tools, &policy(&dir, |_| {}), "read_file", json!({"path": "../../etc/passwd"})).await;
        assert!(error_of(&result).contains("outside the workspace"));
    }

    #[tokio::test]
    async fn test_write_disabled_leaves_disk_untouched() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(
            &tools,
            &policy(&dir, |_| {}),
            "write_file",
            json!({"path": "new.txt", "content": "data"}),
        )
        .await;
        assert!(error_of(&result).contains("disabled"));
        assert!(!dir.path().join("new.txt").exists());
    }

    #[tokio::test]
    async fn test_write_and_replace_when_enabled() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let policy = permissive(&dir);

        let result = call(&tools, &policy, "write_file", json!({"path": "notes/a.txt", "content": "alpha\nbeta\n"})).await;
        assert_eq!(result.output, "Wrote 11 bytes to notes/a.txt");

        let result = call(
            &tools,
            &policy,
            "replace_in_file",
            json!({"path": "notes/a.txt", "old_text": "beta", "new_text": "gamma"}),
        )
        .await;
        assert!(!result.is_error(), "{:?}", result.error);
        assert_eq!(fs::read_to_string(dir.path().join("notes/a.txt")).unwrap(), "alpha\ngamma\n");
    }

    #[tokio::test]
    async fn test_write_into_config_dir_refused() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(
            &tools,
            &permissive(&dir),
            "write_file",
            json!({"path": ".warden/permissions.toml", "content": "run_command = true"}),
        )
        .await;
        assert!(error_of(&result).contains(".warden/"));
        assert!(!dir.path().join(".warden/permissions.toml").exists());
    }

    #[tokio::test]
    async fn test_list_and_search() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let policy = policy(&dir, |_| {});

        let listing = call(&tools, &policy, "list_dir", json!({})).await;
        assert!(listing.output.contains("src/"));

        let hits = call(&tools, &policy, "search_in_files", json!({"query": "PRINTLN"})).await;
        assert!(hits.output.contains("src/main.rs:2:"), "{}", hits.output);

        let hits = call(&tools, &policy, "search_code", json!({"pattern": r"fn\s+main", "file_extension": "rs"})).await;
        assert!(hits.output.starts_with("src/main.rs:1:"), "{}", hits.output);
    }

    // ── 3. commands ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_command_disabled() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(&tools, &policy(&dir, |_| {}), "run_command", json!({"command": "echo hi"})).await;
        assert_eq!(error_of(&result), "Command execution is disabled by policy");
    }

    #[tokio::test]
    async fn test_command_runs_in_workspace_root() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(&tools, &permissive(&dir), "run_command", json!({"command": "ls src"})).await;
        assert_eq!(result.output.trim(), "main.rs");
    }

    #[tokio::test]
    async fn test_denied_and_failing_commands() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let policy = permissive(&dir);

        let result = call(&tools, &policy, "run_command", json!({"command": "sudo ls"})).await;
        assert!(error_of(&result).contains("deny pattern"));

        let result = call(&tools, &policy, "run_command", json!({"command": "echo broken >&2; exit 2"})).await;
        let err = error_of(&result);
        assert!(err.starts_with("Command failed"));
        assert!(err.contains("broken"));
        assert!(err.contains("[exit code 2]"));
    }

    #[tokio::test]
    async fn test_command_output_is_redacted() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(
            &tools,
            &permissive(&dir),
            "run_command",
            json!({"command": "echo token=abcd1234efgh"}),
        )
        .await;
        assert!(!result.output.contains("abcd1234efgh"));
        assert!(result.output.contains("[REDACTED]"));
    }

    // ── 4. network ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fetch_requires_network_access() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(&tools, &policy(&dir, |_| {}), "fetch_url", json!({"url": "https://example.com"})).await;
        assert!(error_of(&result).to_lowercase().contains("network"));
    }

    #[tokio::test]
    async fn test_fetch_internal_host_blocked() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let result = call(&tools, &permissive(&dir), "fetch_url", json!({"url": "http://169.254.169.254/latest"})).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_fetch_rate_limited_before_any_request() {
        let dir = workspace();
        let settings = ToolSettings {
            fetch_rate_limit: 0,
            ..ToolSettings::default()
        };
        let tools = WorkspaceTools::new(settings);
        let result = call(&tools, &permissive(&dir), "fetch_url", json!({"url": "https://example.com/docs"})).await;
        assert!(error_of(&result).starts_with("Fetch rate limit reached"));
    }

    // ── 5. semantic search ───────────────────────────────────────────────────

    struct FixedIndex;

    impl SemanticIndex for FixedIndex {
        fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
            Ok(vec![SearchHit {
                path: "src/server.rs".to_string(),
                score: 0.9,
                snippet: format!("matched {query} (limit {limit})"),
            }])
        }
    }

    #[tokio::test]
    async fn test_semantic_search_needs_an_index() {
        let dir = workspace();
        let policy = policy(&dir, |_| {});

        let without = WorkspaceTools::new(ToolSettings::default());
        let result = call(&without, &policy, "semantic_search", json!({"query": "http server"})).await;
        assert!(error_of(&result).contains("not available"));

        let with = WorkspaceTools::new(ToolSettings::default()).with_index(Arc::new(FixedIndex));
        let result = call(&with, &policy, "semantic_search", json!({"query": "http server", "limit": 3})).await;
        assert_eq!(result.output, "src/server.rs (0.90)\nmatched http server (limit 3)");
    }

    // ── 6. approval preview ──────────────────────────────────────────────────

    #[test]
    fn test_preview_diff_for_edit() {
        let dir = workspace();
        let tools = WorkspaceTools::new(ToolSettings::default());
        let policy = permissive(&dir);
        let edit = ToolCall::new(
            "t1",
            "replace_in_file",
            json!({"path": "src/main.rs", "old_text": "\"hi\"", "new_text": "\"hello\""}),
        );
        let diff = tools
            .preview_diff(ToolName::ReplaceInFile, &edit, &policy)
            .expect("edit should have a preview");
        assert!(diff.contains("-    println!(\"hi\");"));
        assert!(diff.contains("+    println!(\"hello\");"));

        let read = ToolCall::new("t2", "read_file", json!({"path": "src/main.rs"}));
        assert!(tools.preview_diff(ToolName::ReadFile, &read, &policy).is_none());
    }

    // ── 7. verification ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_verify_result_appended_after_write() {
        let dir = workspace();
        let policy = permissive(&dir);

        let passing = WorkspaceTools::new(ToolSettings {
            verify_command: Some("true".to_string()),
            ..ToolSettings::default()
        });
        let result = call(&passing, &policy, "write_file", json!({"path": "a.txt", "content": "x"})).await;
        assert!(result.output.ends_with("[verify] `true` passed"), "{}", result.output);

        let failing = WorkspaceTools::new(ToolSettings {
            verify_command: Some("echo build broke; exit 1".to_string()),
            ..ToolSettings::default()
        });
        let result = call(&failing, &policy, "write_file", json!({"path": "b.txt", "content": "y"})).await;
        assert!(!result.is_error());
        assert!(result.output.contains("failed:\nbuild broke"), "{}", result.output);
    }

    #[tokio::test]
    async fn test_check_errors_uses_configured_command() {
        let dir = workspace();
        let policy = policy(&dir, |_| {});

        let unconfigured = WorkspaceTools::new(ToolSettings::default());
        let result = call(&unconfigured, &policy, "check_errors", json!({})).await;
        assert!(error_of(&result).contains("check_command"));

        let configured = WorkspaceTools::new(ToolSettings {
            check_command: Some("echo 'src/main.rs:1: warning'; exit 1".to_string()),
            ..ToolSettings::default()
        });
        let result = call(&configured, &policy, "check_errors", json!({})).await;
        assert!(result.output.contains("reported problems"));
        assert!(result.output.contains("src/main.rs:1: warning"));
    }

    // ── 8. git ───────────────────────────────────────────────────────────────

    fn git(dir: &TempDir, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(status.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&status.stderr));
    }

    /// A repository with a committed file under `src/` and one under `docs/`,
    /// both modified afterwards.
    fn repo() -> TempDir {
        let dir = workspace();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/notes.md"), "draft\n").unwrap();
        git(&dir, &["init", "-q"]);
        git(&dir, &["config", "user.email", "dev@example.com"]);
        git(&dir, &["config", "user.name", "Dev"]);
        git(&dir, &["add", "-A"]);
        git(&dir, &["commit", "-q", "-m", "initial"]);
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("docs/notes.md"), "internal plans\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_git_tools_stay_inside_allowed_paths() {
        let dir = repo();
        let tools = WorkspaceTools::new(ToolSettings::default());

        let open = policy(&dir, |_| {});
        let result = call(&tools, &open, "git_diff", json!({})).await;
        assert!(result.output.contains("docs/notes.md"));
        assert!(result.output.contains("src/main.rs"));

        let scoped = policy(&dir, |c| c.allowed_paths = vec!["src".to_string()]);
        let result = call(&tools, &scoped, "git_diff", json!({})).await;
        assert!(result.output.contains("src/main.rs"), "{}", result.output);
        assert!(!result.output.contains("docs/notes.md"));
        assert!(!result.output.contains("internal plans"));

        let result = call(&tools, &scoped, "git_status", json!({})).await;
        assert!(result.output.contains("src/main.rs"), "{}", result.output);
        assert!(!result.output.contains("docs"));

        let result = call(&tools, &scoped, "git_diff", json!({"path": "docs/notes.md"})).await;
        assert!(error_of(&result).contains("allowed paths"));
    }
}
