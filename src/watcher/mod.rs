//! Incremental tailing of the session log tree.
//!
//! Files that exist when the tailer starts are recorded at their current size
//! before the filesystem watcher is activated, so history is never replayed.
//! Only bytes appended afterwards are parsed and published as
//! [`PipeEvent::Message`]. Files created after startup are read from the
//! beginning because all of their content is new.

pub mod positions;
pub mod session_path;

pub use positions::{FileCursor, TailPositions};
pub use session_path::{
    expand_tilde, find_jsonl_files, is_jsonl, scan_jsonl_files, session_id_from_path,
};

use crate::error::Result;
use crate::events::{EventBus, PipeEvent};
use crate::record::{parse_line, Record};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tails every `*.jsonl` file below a root directory.
pub struct LogTailer {
    root: PathBuf,
    positions: TailPositions,
    bus: EventBus,
}

impl LogTailer {
    pub fn new(root: impl Into<PathBuf>, bus: EventBus) -> Self {
        Self {
            root: root.into(),
            positions: TailPositions::new(),
            bus,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn positions(&self) -> &TailPositions {
        &self.positions
    }

    /// Create the root if needed and record the size of every existing log.
    ///
    /// Returns the number of files recorded.
    pub async fn prime(&mut self) -> usize {
        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            warn!("Could not create watch directory {:?}: {}", self.root, e);
        }

        let root = self.root.clone();
        let count = self.adopt_tree(&root).await;
        info!("Recorded positions for {} existing session files", count);
        count
    }

    /// Start tracking `path` at its current size without reading it.
    ///
    /// Already tracked files keep their offset. Returns whether the file is tracked.
    pub async fn adopt(&mut self, path: &Path) -> bool {
        if self.positions.offset(path).is_some() {
            return true;
        }
        match tokio::fs::metadata(path).await {
            Ok(metadata) => {
                self.positions.track(path, metadata.len());
                true
            }
            Err(e) => {
                warn!("Failed to stat {:?}: {}", path, e);
                false
            }
        }
    }

    async fn adopt_tree(&mut self, root: &Path) -> usize {
        let files = match scan_jsonl_files(root).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to scan {:?}: {}", root, e);
                return 0;
            }
        };
        let mut count = 0;
        for path in files {
            if self.adopt(&path).await {
                count += 1;
            }
        }
        count
    }

    /// Read whatever was appended to `path` since the last call and parse it.
    ///
    /// A file that has not grown, or that shrank, is not read and keeps its
    /// offset. An untracked file is read from the start.
    pub async fn poll_file(&mut self, path: &Path) -> Result<Vec<Record>> {
        let size = tokio::fs::metadata(path).await?.len();
        let offset = match self.positions.offset(path) {
            Some(offset) => offset,
            None => {
                self.positions.track(path, 0);
                0
            }
        };

        if size <= offset {
            if size < offset {
                debug!(
                    "File {:?} shrank from {} to {} bytes, skipping",
                    path, offset, size
                );
            }
            return Ok(Vec::new());
        }

        let mut file = tokio::fs::File::open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut chunk = Vec::with_capacity((size - offset) as usize);
        file.take(size - offset).read_to_end(&mut chunk).await?;

        let session_id = session_id_from_path(path);
        let records = self
            .positions
            .advance(path, &chunk)
            .iter()
            .filter_map(|line| parse_line(line))
            .map(|mut record| {
                if record.session_id.is_none() {
                    record.session_id = session_id.clone();
                }
                record
            })
            .collect();

        Ok(records)
    }

    /// Poll `path` and publish its new records. Errors are logged and the file skipped.
    pub async fn process_file(&mut self, path: &Path) -> usize {
        match self.poll_file(path).await {
            Ok(records) => {
                let count = records.len();
                for record in records {
                    self.bus.publish(PipeEvent::Message(record));
                }
                if count > 0 {
                    debug!("Published {} records from {:?}", count, path);
                }
                count
            }
            Err(e) => {
                warn!("Failed to process session file {:?}: {}", path, e);
                0
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event.kind {
            EventKind::Modify(ModifyKind::Name(mode)) => self.handle_rename(mode, event.paths).await,
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    if is_jsonl(&path) {
                        self.process_file(&path).await;
                    } else if path.is_dir() {
                        self.process_new_dir(&path).await;
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    self.forget(&path);
                }
            }
            _ => {}
        }
    }

    /// Files written before a newly created directory was watched.
    async fn process_new_dir(&mut self, dir: &Path) {
        let files = match scan_jsonl_files(dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to scan {:?}: {}", dir, e);
                return;
            }
        };
        for child in files {
            if self.positions.offset(&child).is_none() {
                self.process_file(&child).await;
            }
        }
    }

    /// Content that arrives by rename existed before it was observed, so the
    /// destination is recorded at its current size like a file found at startup.
    async fn handle_rename(&mut self, mode: RenameMode, paths: Vec<PathBuf>) {
        let (from, to): (Vec<PathBuf>, Vec<PathBuf>) = match mode {
            RenameMode::From => (paths, Vec::new()),
            RenameMode::To => (Vec::new(), paths),
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                (paths.next().into_iter().collect(), paths.collect())
            }
            _ => paths.into_iter().partition(|path| !path.exists()),
        };

        for path in from {
            self.forget(&path);
        }
        for path in to {
            if is_jsonl(&path) {
                if self.positions.offset(&path).is_some() {
                    self.process_file(&path).await;
                } else {
                    self.adopt(&path).await;
                }
            } else if path.is_dir() {
                self.adopt_tree(&path).await;
            }
        }
    }

    fn forget(&mut self, path: &Path) {
        if self.positions.forget(path).is_some() {
            debug!("Stopped tracking {:?}", path);
        }
    }

    /// Prime the positions, activate the filesystem watcher and run the
    /// tailing loop on a background task.
    pub async fn start(mut self) -> Result<TailerHandle> {
        self.prime().await;

        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        info!("Watching session logs at: {:?}", self.root);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            // Dropping the watcher at the end of the loop ends notifications.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    received = rx.recv() => match received {
                        Some(Ok(event)) => self.handle_event(event).await,
                        Some(Err(e)) => warn!("Watch error: {}", e),
                        None => break,
                    },
                }
            }
            info!("Session log watching stopped");
        });

        Ok(TailerHandle {
            shutdown: Some(shutdown_tx),
            join,
        })
    }
}

/// Handle to a running tailer loop.
pub struct TailerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl TailerHandle {
    /// Stop receiving notifications and wait for the loop to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.join).await {
            warn!("Tailer task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn line(uuid: &str, role: &str) -> String {
        format!(
            "{{\"uuid\":\"{uuid}\",\"timestamp\":\"2025-01-01T00:00:00Z\",\"message\":{{\"role\":\"{role}\",\"content\":[]}}}}\n"
        )
    }

    #[tokio::test]
    async fn test_prime_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("does/not/exist");
        let mut tailer = LogTailer::new(&root, EventBus::default());

        assert_eq!(tailer.prime().await, 0);
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_existing_content_is_never_replayed() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("s.jsonl");
        append(&file, &line("old-1", "user"));
        append(&file, &line("old-2", "assistant"));

        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        assert_eq!(tailer.prime().await, 1);
        assert!(tailer.poll_file(&file).await.unwrap().is_empty());

        append(&file, &line("new-1", "user"));
        let records = tailer.poll_file(&file).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uuid.as_deref(), Some("new-1"));
    }

    #[tokio::test]
    async fn test_appends_are_emitted_in_order_with_partial_lines_held() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("s.jsonl");
        std::fs::write(&file, "").unwrap();

        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;

        let second = line("b", "assistant");
        let (head, tail) = second.split_at(10);
        append(&file, &format!("{}{}", line("a", "user"), head));

        let first_batch = tailer.poll_file(&file).await.unwrap();
        assert_eq!(first_batch.len(), 1);
        assert_eq!(first_batch[0].uuid.as_deref(), Some("a"));

        append(&file, &format!("{}{}", tail, line("c", "user")));
        let second_batch = tailer.poll_file(&file).await.unwrap();
        let uuids: Vec<_> = second_batch
            .iter()
            .map(|r| r.uuid.clone().unwrap())
            .collect();
        assert_eq!(uuids, vec!["b", "c"]);
        assert_eq!(
            tailer.positions().offset(&file),
            Some(std::fs::metadata(&file).unwrap().len())
        );
    }

    #[tokio::test]
    async fn test_truncated_file_emits_nothing_and_keeps_offset() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("s.jsonl");
        append(&file, &line("a", "user"));
        append(&file, &line("b", "user"));

        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;
        let recorded = tailer.positions().offset(&file).unwrap();

        std::fs::write(&file, line("c", "user")).unwrap();
        assert!(tailer.poll_file(&file).await.unwrap().is_empty());
        assert_eq!(tailer.positions().offset(&file), Some(recorded));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("s.jsonl");
        std::fs::write(&file, "").unwrap();

        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;

        append(&file, &format!("{{broken\n\n{}", line("ok", "user")));
        let records = tailer.poll_file(&file).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uuid.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_session_id_backfilled_from_path() {
        let dir = TempDir::new().unwrap();
        let session_dir = dir.path().join("proj/sessions/sess-42");
        std::fs::create_dir_all(&session_dir).unwrap();
        let file = session_dir.join("log.jsonl");
        std::fs::write(&file, "").unwrap();

        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;

        append(&file, &line("a", "user"));
        append(
            &file,
            "{\"sessionId\":\"explicit\",\"message\":{\"role\":\"assistant\"}}\n",
        );
        let records = tailer.poll_file(&file).await.unwrap();
        assert_eq!(records[0].session_id.as_deref(), Some("sess-42"));
        assert_eq!(records[1].session_id.as_deref(), Some("explicit"));
    }

    #[tokio::test]
    async fn test_unidentified_records_are_still_emitted() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("loose.jsonl");
        std::fs::write(&file, "").unwrap();

        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;
        append(&file, &line("a", "user"));

        let records = tailer.poll_file(&file).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, None);
    }

    #[tokio::test]
    async fn test_file_created_after_start_is_read_from_beginning() {
        let dir = TempDir::new().unwrap();
        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;

        let file = dir.path().join("new.jsonl");
        append(&file, &line("first", "user"));
        let records = tailer.poll_file(&file).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uuid.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_process_file_publishes_to_bus() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("s.jsonl");
        std::fs::write(&file, "").unwrap();

        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let mut tailer = LogTailer::new(dir.path(), bus);
        tailer.prime().await;

        append(&file, &line("a", "user"));
        assert_eq!(tailer.process_file(&file).await, 1);

        match rx.recv().await.unwrap() {
            PipeEvent::Message(record) => assert_eq!(record.uuid.as_deref(), Some("a")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_renamed_in_file_is_not_replayed() {
        let dir = TempDir::new().unwrap();
        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;

        let outside = TempDir::new().unwrap();
        let staged = outside.path().join("moved.jsonl");
        append(&staged, &line("before", "user"));
        let file = dir.path().join("moved.jsonl");
        std::fs::rename(&staged, &file).unwrap();

        tailer
            .handle_event(
                Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
                    .add_path(file.clone()),
            )
            .await;
        assert_eq!(
            tailer.positions().offset(&file),
            Some(std::fs::metadata(&file).unwrap().len())
        );

        append(&file, &line("after", "user"));
        let records = tailer.poll_file(&file).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uuid.as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn test_rename_within_tree_forgets_source() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("a.jsonl");
        append(&old, &line("old", "user"));

        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;

        let new = dir.path().join("b.jsonl");
        std::fs::rename(&old, &new).unwrap();
        tailer
            .handle_event(
                Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
                    .add_path(old.clone())
                    .add_path(new.clone()),
            )
            .await;

        assert_eq!(tailer.positions().offset(&old), None);
        assert!(tailer.poll_file(&new).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_renamed_in_directory_is_not_replayed() {
        let dir = TempDir::new().unwrap();
        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        tailer.prime().await;

        let outside = TempDir::new().unwrap();
        let staged = outside.path().join("project");
        std::fs::create_dir_all(&staged).unwrap();
        append(&staged.join("s.jsonl"), &line("before", "user"));
        let project = dir.path().join("project");
        std::fs::rename(&staged, &project).unwrap();

        tailer
            .handle_event(
                Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
                    .add_path(project.clone()),
            )
            .await;
        assert!(tailer
            .poll_file(&project.join("s.jsonl"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_process_missing_file_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let mut tailer = LogTailer::new(dir.path(), EventBus::default());
        assert_eq!(tailer.process_file(&dir.path().join("gone.jsonl")).await, 0);
    }
}
