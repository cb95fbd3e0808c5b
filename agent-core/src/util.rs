use std::path::Path;
use std::path::PathBuf;

use crate::error::AgentError;
use crate::error::Result;

/// Resolves `path` (absolute or relative) against `workspace_root` and
/// rejects it unless the canonicalized result is the root itself or a
/// descendant of it.
///
/// The canonicalization happens on the *parent* directory when `path`
/// itself does not yet exist (e.g. a file about to be created by
/// `write_file`), so that new files are still checked.
pub fn resolve_in_workspace(workspace_root: &Path, path: &str) -> Result<PathBuf> {
    let candidate = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        workspace_root.join(path)
    };

    let root = workspace_root
        .canonicalize()
        .map_err(|e| AgentError::Tool(format!("cannot canonicalize workspace root: {e}")))?;

    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| AgentError::Tool(format!("cannot canonicalize path: {e}")))?
    } else {
        let parent = candidate.parent().unwrap_or(&candidate);
        let canon_parent = parent
            .canonicalize()
            .map_err(|e| AgentError::Tool(format!("cannot canonicalize parent: {e}")))?;
        match candidate.file_name() {
            Some(name) => canon_parent.join(name),
            None => canon_parent,
        }
    };

    if resolved == root || resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(AgentError::WorkspaceEscape(format!(
            "path {path} resolves outside workspace root"
        )))
    }
}

/// Truncates `text` to at most `limit` bytes on a char boundary, appending
/// a marker.
pub fn summarize(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...<truncated>", &text[..end])
}

/// Truncates a byte buffer to its last `limit` bytes, as `run_shell`
/// requires for stdout/stderr.
pub fn tail_bytes(data: &[u8], limit: usize) -> (&[u8], bool) {
    if data.len() <= limit {
        (data, false)
    } else {
        (&data[data.len() - limit..], true)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_escape_outside_workspace() {
        let dir = tempdir().unwrap();
        let result = resolve_in_workspace(dir.path(), "../../etc/passwd");
        assert!(result.is_err());
    }

    #[test]
    fn accepts_path_within_workspace() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let result = resolve_in_workspace(dir.path(), "a.txt");
        assert!(result.is_ok());
    }

    #[test]
    fn summarize_truncates_long_text() {
        let text = "x".repeat(100);
        let out = summarize(&text, 10);
        assert!(out.ends_with("...<truncated>"));
        assert_eq!(&out[..10], "x".repeat(10).as_str());
    }
}
