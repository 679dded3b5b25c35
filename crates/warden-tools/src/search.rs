//! Workspace text and regex search.
//!
//! Traversal runs on the blocking pool. Hidden directories, build output and
//! dependency trees are skipped, as are binary and oversized files. Matching
//! lines are redacted before they are returned.

use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use warden_security::redact_secrets;

const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "dist", "build"];
const MAX_FILE_BYTES: u64 = 1024 * 1024;
const MAX_LINE_CHARS: usize = 240;
pub const DEFAULT_MAX_RESULTS: usize = 50;

enum Matcher {
    Text(String),
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Text(needle) => line.to_lowercase().contains(needle),
            Matcher::Pattern(re) => re.is_match(line),
        }
    }
}

/// Case-insensitive plain-text search under `base`.
pub async fn search_text(
    root: &Path,
    base: &Path,
    query: &str,
    max_results: Option<u64>,
) -> Result<String, String> {
    let matcher = Matcher::Text(query.to_lowercase());
    run(root, base, matcher, None, max_results).await
}

/// Regex search under `base`, optionally limited to one file extension.
pub async fn search_code(
    root: &Path,
    base: &Path,
    pattern: &str,
    extension: Option<&str>,
    max_results: Option<u64>,
) -> Result<String, String> {
    let re = RegexBuilder::new(pattern)
        .size_limit(1 << 20)
        .build()
        .map_err(|e| format!("Invalid regular expression: {e}"))?;
    let extension = extension.map(|e| e.trim_start_matches('.').to_string());
    run(root, base, Matcher::Pattern(re), extension, max_results).await
}

async fn run(
    root: &Path,
    base: &Path,
    matcher: Matcher,
    extension: Option<String>,
    max_results: Option<u64>,
) -> Result<String, String> {
    let limit = max_results
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .max(1);
    let root = root.to_path_buf();
    let base = base.to_path_buf();

    tokio::task::spawn_blocking(move || walk(&root, &base, &matcher, extension.as_deref(), limit))
        .await
        .map_err(|e| format!("Search task failed: {e}"))
}

fn walk(root: &Path, base: &Path, matcher: &Matcher, extension: Option<&str>, limit: usize) -> String {
    let mut hits = Vec::new();
    let mut truncated = false;
    let mut files_scanned = 0usize;

    let walker = WalkDir::new(base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e));

    'files: for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(ext) = extension {
            if entry.path().extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
        }
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        files_scanned += 1;

        let shown = relative(root, entry.path());
        for (i, line) in text.lines().enumerate() {
            if !matcher.is_match(line) {
                continue;
            }
            if hits.len() == limit {
                truncated = true;
                break 'files;
            }
            hits.push(format!("{shown}:{}: {}", i + 1, clip(line.trim())));
        }
    }

    debug!(files_scanned, hits = hits.len(), truncated, "search finished");
    if hits.is_empty() {
        return "No matches found".to_string();
    }
    let mut out = redact_secrets(&hits.join("\n"));
    if truncated {
        out.push_str(&format!("\n[results limited to {limit}]"));
    }
    out
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_dir() && (name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()))
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn clip(line: &str) -> String {
    if line.chars().count() <= MAX_LINE_CHARS {
        line.to_string()
    } else {
        let head: String = line.chars().take(MAX_LINE_CHARS).collect();
        format!("{head}...")
    }
}
