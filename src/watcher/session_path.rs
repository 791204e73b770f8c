//! Path conventions of the session log tree.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Directory segment that precedes a session id segment.
const SESSIONS_SEGMENT: &str = "sessions";

/// Derive a session id from `.../sessions/<id>/<file>.jsonl`.
///
/// The id segment must be a directory, so `.../sessions/file.jsonl` yields `None`.
pub fn session_id_from_path(path: &Path) -> Option<String> {
    let segments: Vec<&std::ffi::OsStr> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment),
            _ => None,
        })
        .collect();

    segments
        .iter()
        .enumerate()
        .find(|(idx, segment)| **segment == SESSIONS_SEGMENT && idx + 2 < segments.len())
        .and_then(|(idx, _)| segments[idx + 1].to_str())
        .map(String::from)
}

pub fn is_jsonl(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("jsonl")
}

/// All `*.jsonl` files below `root`. Unreadable entries are skipped.
pub fn find_jsonl_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_jsonl(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// [`find_jsonl_files`] on the blocking pool, for use from async tasks.
pub async fn scan_jsonl_files(root: &Path) -> Result<Vec<PathBuf>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || find_jsonl_files(&root))
        .await
        .map_err(|e| Error::Internal(format!("session scan failed: {e}")))
}

/// Replace a leading `~` with the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_id_follows_sessions_segment() {
        let path = Path::new("/home/u/.claude/projects/hash/sessions/abc-123/log.jsonl");
        assert_eq!(session_id_from_path(path).as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_session_id_requires_directory_segment() {
        let path = Path::new("/home/u/.claude/projects/hash/sessions/log.jsonl");
        assert_eq!(session_id_from_path(path), None);
    }

    #[test]
    fn test_session_id_requires_exact_segment_name() {
        let path = Path::new("/data/mysessions/abc/log.jsonl");
        assert_eq!(session_id_from_path(path), None);
        let path = Path::new("/home/u/.claude/projects/hash/abc.jsonl");
        assert_eq!(session_id_from_path(path), None);
    }

    #[test]
    fn test_is_jsonl() {
        assert!(is_jsonl(Path::new("a/b.jsonl")));
        assert!(!is_jsonl(Path::new("a/b.json")));
        assert!(!is_jsonl(Path::new("a/jsonl")));
    }

    #[test]
    fn test_find_jsonl_files_recurses() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("p/sessions/s1");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("log.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("top.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let mut files = find_jsonl_files(dir.path());
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_jsonl(f)));
    }

    #[tokio::test]
    async fn test_scan_jsonl_files_runs_off_the_async_task() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("p")).unwrap();
        std::fs::write(dir.path().join("p/a.jsonl"), "").unwrap();

        let files = scan_jsonl_files(dir.path()).await.unwrap();
        assert_eq!(files, vec![dir.path().join("p/a.jsonl")]);
    }

    #[test]
    fn test_find_jsonl_files_missing_root_is_empty() {
        assert!(find_jsonl_files(Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn test_expand_tilde() {
        let plain = Path::new("/var/log");
        assert_eq!(expand_tilde(plain), plain);
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/.claude")), home.join(".claude"));
        }
    }
}
