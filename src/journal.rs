//! Append-only audit journal of every pipeline event.
//!
//! Each line is `{"timestamp": ..., "category": ..., "data": ...}` where
//! `category` is `watcher-message` or the lifecycle event type.

use crate::error::Result;
use crate::events::PipeEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const JOURNAL_FILE: &str = "server.log";

#[derive(Debug, Serialize)]
struct JournalEntry<'a, T: Serialize> {
    timestamp: DateTime<Utc>,
    category: &'a str,
    data: &'a T,
}

pub struct EventJournal {
    path: PathBuf,
    file: File,
}

impl EventJournal {
    /// Open (creating if needed) `<log_dir>/server.log` for appending.
    pub async fn open(log_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(log_dir).await?;
        let path = log_dir.join(JOURNAL_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        info!("Journaling events to {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, event: &PipeEvent) -> Result<()> {
        let category = event.category();
        let mut line = match event {
            PipeEvent::Message(record) => serde_json::to_string(&JournalEntry {
                timestamp: Utc::now(),
                category,
                data: record,
            })?,
            PipeEvent::Lifecycle(lifecycle) => serde_json::to_string(&JournalEntry {
                timestamp: Utc::now(),
                category,
                data: lifecycle,
            })?,
        };
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// Append every event from `rx` until the bus closes. Write errors are logged.
    pub fn spawn(mut self, mut rx: broadcast::Receiver<PipeEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = self.append(&event).await {
                            warn!("Failed to write journal entry to {}: {}", self.path.display(), e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Journal fell behind, {} events not recorded", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Journal stopped");
        })
    }
}
