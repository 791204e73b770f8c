//! Per-file read cursors for incremental tailing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Read state of one log file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCursor {
    /// Byte offset up to which the file has been read.
    pub offset: u64,
    /// Trailing bytes read so far that are not yet terminated by a newline.
    pub pending: Vec<u8>,
}

/// Cursor table keyed by file path. Offsets never move backwards.
#[derive(Debug, Default)]
pub struct TailPositions {
    cursors: HashMap<PathBuf, FileCursor>,
}

impl TailPositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `path` at `offset`. Existing cursors are left alone.
    pub fn track(&mut self, path: &Path, offset: u64) {
        self.cursors
            .entry(path.to_path_buf())
            .or_insert_with(|| FileCursor {
                offset,
                pending: Vec::new(),
            });
    }

    pub fn offset(&self, path: &Path) -> Option<u64> {
        self.cursors.get(path).map(|cursor| cursor.offset)
    }

    pub fn cursor(&self, path: &Path) -> Option<&FileCursor> {
        self.cursors.get(path)
    }

    pub fn forget(&mut self, path: &Path) -> Option<FileCursor> {
        self.cursors.remove(path)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Consume `chunk`, read from the current offset, and return the lines it
    /// completes. The unterminated tail is kept for the next call.
    pub fn advance(&mut self, path: &Path, chunk: &[u8]) -> Vec<String> {
        let cursor = self.cursors.entry(path.to_path_buf()).or_default();
        cursor.offset += chunk.len() as u64;
        cursor.pending.extend_from_slice(chunk);

        let Some(last_newline) = cursor.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = cursor.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut cursor.pending, rest);

        complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }
}
