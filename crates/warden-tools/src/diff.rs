//! Line diff preview shown with write approvals.
//!
//! The preview is a single unified hunk: the common prefix and suffix are
//! trimmed, and what remains in between is shown as removed and added lines
//! with a few lines of context on either side.

const CONTEXT_LINES: usize = 3;
const MAX_PREVIEW_LINES: usize = 200;

pub fn unified(path: &str, old: &str, new: &str) -> Option<String> {
    if old == new {
        return None;
    }
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let max_suffix = a.len().min(b.len()) - prefix;
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();

    let start = prefix.saturating_sub(CONTEXT_LINES);
    let a_end = (a.len() - suffix + CONTEXT_LINES).min(a.len());
    let b_end = (b.len() - suffix + CONTEXT_LINES).min(b.len());

    let mut lines = Vec::new();
    for line in &a[start..prefix] {
        lines.push(format!(" {line}"));
    }
    for line in &a[prefix..a.len() - suffix] {
        lines.push(format!("-{line}"));
    }
    for line in &b[prefix..b.len() - suffix] {
        lines.push(format!("+{line}"));
    }
    for line in &a[a.len() - suffix..a_end] {
        lines.push(format!(" {line}"));
    }

    let mut out = format!(
        "--- a/{path}\n+++ b/{path}\n@@ -{},{} +{},{} @@\n",
        hunk_start(start, a_end),
        a_end - start,
        hunk_start(start, b_end),
        b_end - start,
    );
    let total = lines.len();
    for line in lines.iter().take(MAX_PREVIEW_LINES) {
        out.push_str(line);
        out.push('\n');
    }
    if total > MAX_PREVIEW_LINES {
        out.push_str(&format!("... {} more lines\n", total - MAX_PREVIEW_LINES));
    }
    Some(out)
}

fn hunk_start(start: usize, end: usize) -> usize {
    if end == start {
        start
    } else {
        start + 1
    }
}
