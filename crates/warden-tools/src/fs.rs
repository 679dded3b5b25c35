//! Filesystem tools. Paths arrive already resolved by the permission policy;
//! `shown` is the workspace-relative form used in messages.

use std::path::Path;

use tokio::fs;
use tracing::{debug, info};

use warden_security::redact_secrets;

const MAX_DIR_ENTRIES: usize = 500;

pub async fn list_dir(dir: &Path, shown: &str) -> Result<String, String> {
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|e| format!("Cannot list '{shown}': {e}"))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| format!("Cannot list '{shown}': {e}"))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push(if is_dir { format!("{name}/") } else { name });
    }
    entries.sort();

    if entries.is_empty() {
        return Ok(format!("{shown} is empty"));
    }
    let total = entries.len();
    let mut out = entries
        .into_iter()
        .take(MAX_DIR_ENTRIES)
        .collect::<Vec<_>>()
        .join("\n");
    if total > MAX_DIR_ENTRIES {
        out.push_str(&format!("\n... {} more entries", total - MAX_DIR_ENTRIES));
    }
    Ok(out)
}

/// Read a text file, optionally restricted to a 1-based inclusive line
/// range. Secrets are redacted before anything leaves this function.
pub async fn read_file(
    path: &Path,
    shown: &str,
    start_line: Option<u64>,
    end_line: Option<u64>,
    max_bytes: u64,
) -> Result<String, String> {
    let meta = fs::metadata(path)
        .await
        .map_err(|e| format!("Cannot read '{shown}': {e}"))?;
    if meta.is_dir() {
        return Err(format!("'{shown}' is a directory; use list_dir"));
    }
    if meta.len() > max_bytes {
        return Err(format!(
            "'{shown}' is {} bytes, over the {max_bytes}-byte read limit; request a line range",
            meta.len()
        ));
    }

    let bytes = fs::read(path)
        .await
        .map_err(|e| format!("Cannot read '{shown}': {e}"))?;
    let text = String::from_utf8(bytes).map_err(|_| format!("'{shown}' is not a UTF-8 text file"))?;

    let content = if start_line.is_none() && end_line.is_none() {
        text
    } else {
        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len();
        let start = start_line.unwrap_or(1).max(1) as usize;
        let end = (end_line.unwrap_or(total as u64) as usize).min(total);
        if start > end {
            return Err(format!(
                "Line range {start}-{end} is empty; '{shown}' has {total} lines"
            ));
        }
        let body = lines[start - 1..end].join("\n");
        format!("[lines {start}-{end} of {total}]\n{body}")
    };
    debug!(path = %shown, bytes = content.len(), "file read");
    Ok(redact_secrets(&content))
}

pub async fn write_file(path: &Path, shown: &str, content: &str) -> Result<String, String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Cannot create directories for '{shown}': {e}"))?;
    }
    fs::write(path, content)
        .await
        .map_err(|e| format!("Cannot write '{shown}': {e}"))?;
    info!(path = %shown, bytes = content.len(), "file written");
    Ok(format!("Wrote {} bytes to {shown}", content.len()))
}

/// Replace the single occurrence of `old_text`.
pub async fn replace_in_file(
    path: &Path,
    shown: &str,
    old_text: &str,
    new_text: &str,
) -> Result<String, String> {
    let current = fs::read_to_string(path)
        .await
        .map_err(|e| format!("Cannot read '{shown}': {e}"))?;
    let updated = apply_replacement(&current, shown, old_text, new_text)?;
    fs::write(path, &updated)
        .await
        .map_err(|e| format!("Cannot write '{shown}': {e}"))?;
    info!(path = %shown, removed = old_text.len(), added = new_text.len(), "file edited");
    Ok(format!("Replaced 1 occurrence in {shown}"))
}

pub(crate) fn apply_replacement(
    current: &str,
    shown: &str,
    old_text: &str,
    new_text: &str,
) -> Result<String, String> {
    match current.matches(old_text).count() {
        0 => Err(format!("Text to replace was not found in '{shown}'")),
        1 => Ok(current.replacen(old_text, new_text, 1)),
        n => Err(format!(
            "Text to replace occurs {n} times in '{shown}'; include more surrounding context"
        )),
    }
}
