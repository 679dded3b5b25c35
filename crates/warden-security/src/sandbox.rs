//! Workspace path sandboxing.
//!
//! Paths are resolved component by component. Every segment that exists on
//! disk is dereferenced with `canonicalize`, so a symlinked directory inside
//! the workspace cannot be used to reach a target outside it. Segments that
//! do not exist yet (a file about to be created) are appended lexically, and
//! `..` over them pops the lexical path. Existence is checked per segment, so
//! `missing/../link` still dereferences `link`.
//!
//! The resolved path must start with the canonical workspace root, compared
//! component-wise (`/ws2` is not inside `/ws`).

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use tracing::debug;

/// Canonicalize the workspace root. The root must exist.
pub fn canonical_root(root: &Path) -> Result<PathBuf, String> {
    fs::canonicalize(root)
        .map_err(|e| format!("workspace root '{}' cannot be resolved: {e}", root.display()))
}

/// Resolve `target` (absolute, or relative to `root`) following symlinks on
/// every existing segment.
pub fn resolve_path(root: &Path, target: &str) -> Result<PathBuf, String> {
    let root = canonical_root(root)?;
    let target_path = Path::new(target);

    let mut current = if target_path.is_absolute() {
        PathBuf::from("/")
    } else {
        root.clone()
    };
    for component in target_path.components() {
        match component {
            Component::Prefix(prefix) => current = PathBuf::from(prefix.as_os_str()),
            Component::RootDir => current.push("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                current.pop();
            }
            Component::Normal(name) => {
                let next = current.join(name);
                if fs::symlink_metadata(&next).is_ok() {
                    current = fs::canonicalize(&next).map_err(|e| {
                        format!("path '{target}' cannot be resolved: {e}")
                    })?;
                } else {
                    current = next;
                }
            }
        }
    }

    debug!(target = %target, resolved = %current.display(), "path resolved");
    Ok(current)
}

/// Component-wise prefix test.
pub fn is_within(path: &Path, base: &Path) -> bool {
    path.starts_with(base)
}

/// Resolve `target` and reject it unless it stays inside the workspace.
///
/// Returns the resolved absolute path on success.
pub fn resolve_within(root: &Path, target: &str) -> Result<PathBuf, String> {
    let canonical = canonical_root(root)?;
    let resolved = resolve_path(root, target)?;
    if !is_within(&resolved, &canonical) {
        return Err(format!(
            "Path '{target}' resolves outside the workspace ({})",
            resolved.display()
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn relative_path_inside_workspace_resolves() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();

        let resolved = resolve_within(dir.path(), "src/main.rs").unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(resolved, root.join("src/main.rs"));
    }

    #[test]
    fn new_file_resolves_through_existing_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_within(dir.path(), "new/dir/file.txt").unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(resolved, root.join("new/dir/file.txt"));
    }

    #[test]
    fn dot_dot_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let err = resolve_within(dir.path(), "a/../../outside.txt").unwrap_err();
        assert!(err.contains("outside the workspace"), "{err}");

        // Escaping through a segment that does not exist yet.
        let err = resolve_within(dir.path(), "missing/../../../etc/passwd").unwrap_err();
        assert!(err.contains("outside the workspace"), "{err}");
    }

    #[test]
    fn dot_dot_that_stays_inside_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        assert!(resolve_within(dir.path(), "a/../b.txt").is_ok());
    }

    #[test]
    fn absolute_path_outside_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_within(dir.path(), "/etc/passwd").is_err());
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_inside() {
        let parent = tempfile::tempdir().unwrap();
        let ws = parent.path().join("ws");
        let sibling = parent.path().join("ws2");
        fs::create_dir(&ws).unwrap();
        fs::create_dir(&sibling).unwrap();

        let target = sibling.join("x.txt");
        assert!(resolve_within(&ws, target.to_str().unwrap()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "top secret").unwrap();

        let ws = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.path().join("link")).unwrap();

        // The string looks like it is inside the workspace; the resolved path is not.
        let err = resolve_within(ws.path(), "link/secret.txt").unwrap_err();
        assert!(err.contains("outside the workspace"), "{err}");

        // Creating a new file through the link is rejected too.
        assert!(resolve_within(ws.path(), "link/new.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_after_missing_segment_and_dot_dot_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "top secret").unwrap();

        let ws = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.path().join("link")).unwrap();

        for target in ["missing/../link/secret.txt", "a/b/../../link/secret.txt", "missing/../link/new.txt"] {
            let err = resolve_within(ws.path(), target).unwrap_err();
            assert!(err.contains("outside the workspace"), "{target}: {err}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_workspace_is_allowed() {
        let ws = tempfile::tempdir().unwrap();
        fs::create_dir(ws.path().join("real")).unwrap();
        fs::write(ws.path().join("real/data.txt"), "ok").unwrap();
        std::os::unix::fs::symlink(ws.path().join("real"), ws.path().join("alias")).unwrap();

        let resolved = resolve_within(ws.path(), "alias/data.txt").unwrap();
        let root = fs::canonicalize(ws.path()).unwrap();
        assert_eq!(resolved, root.join("real/data.txt"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = resolve_within(Path::new("/definitely/not/a/workspace"), "a.txt").unwrap_err();
        assert!(err.contains("cannot be resolved"), "{err}");
    }
}
