//! Read-only access to the session log tree for the HTTP API.

use crate::error::{Error, Result};
use crate::record::{parse_line, Record, Role};
use crate::watcher::scan_jsonl_files;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// File stem of the session log.
    pub id: String,
    pub last_modified: DateTime<Utc>,
}

/// Which matching message to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    First,
    Latest,
}

impl std::str::FromStr for Pick {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "first" => Ok(Pick::First),
            "latest" => Ok(Pick::Latest),
            other => Err(format!("expected 'first' or 'latest', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every `*.jsonl` under the root. A missing root yields an empty list.
    pub async fn list(&self) -> Result<Vec<SessionSummary>> {
        let files = self.files().await?;
        let mut sessions = Vec::with_capacity(files.len());
        for path in files {
            let Some(id) = session_stem(&path) else {
                continue;
            };
            match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => sessions.push(SessionSummary {
                    id,
                    last_modified: modified.into(),
                }),
                Err(e) => tracing::debug!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(sessions)
    }

    /// Path of the log whose file stem is `session_id`.
    pub async fn find(&self, session_id: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .files()
            .await?
            .into_iter()
            .find(|path| session_stem(path).as_deref() == Some(session_id)))
    }

    /// All records of a session, in file order.
    pub async fn records(&self, session_id: &str) -> Result<Vec<Record>> {
        let path = self
            .find(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(content.lines().filter_map(parse_line).collect())
    }

    /// First or latest record of `role` in a session.
    pub async fn message(&self, session_id: &str, role: Role, pick: Pick) -> Result<Record> {
        let records = self.records(session_id).await?;
        let mut matching = records.into_iter().filter(|r| r.role() == Some(role));
        let found = match pick {
            Pick::First => matching.next(),
            Pick::Latest => matching.last(),
        };
        found.ok_or_else(|| Error::NotFound(format!("no {} messages found", role.as_str())))
    }

    async fn files(&self) -> Result<Vec<PathBuf>> {
        scan_jsonl_files(&self.root).await
    }
}

fn session_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}
