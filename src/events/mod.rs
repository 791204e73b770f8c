//! Merged event stream shared by the tailer, the process registry and every
//! downstream consumer.
//!
//! ```text
//! LogTailer ───────► Message(Record) ───┐
//!                                       ├──► EventBus ──► dispatcher / websocket / journal
//! ProcessRegistry ─► Lifecycle(event) ──┘
//! ```

pub mod bus;

pub use bus::EventBus;

use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle event types published by the process registry and the canceller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleKind {
    SessionStarted,
    SessionIdentified,
    SessionError,
    SessionTimeout,
    CancelInitiated,
    ProcessExit,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleKind::SessionStarted => "session-started",
            LifecycleKind::SessionIdentified => "session-identified",
            LifecycleKind::SessionError => "session-error",
            LifecycleKind::SessionTimeout => "session-timeout",
            LifecycleKind::CancelInitiated => "cancel-initiated",
            LifecycleKind::ProcessExit => "process-exit",
        }
    }
}

impl std::fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat envelope describing a worker process transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub kind: LifecycleKind,
    pub session_id: String,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed: Option<bool>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, session_id: impl Into<String>, pid: u32) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            pid,
            timestamp: Utc::now(),
            code: None,
            signal: None,
            error: None,
            resumed: None,
        }
    }

    pub fn with_exit(mut self, code: Option<i32>, signal: Option<String>) -> Self {
        self.code = code;
        self.signal = signal;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_resumed(mut self, resumed: bool) -> Self {
        self.resumed = Some(resumed);
        self
    }
}

/// One item of the merged stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PipeEvent {
    /// A record parsed from a session log, identity backfilled when derivable.
    Message(Record),
    /// A worker process transition.
    Lifecycle(LifecycleEvent),
}

impl PipeEvent {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            PipeEvent::Message(record) => record.session_id.as_deref(),
            PipeEvent::Lifecycle(event) => Some(&event.session_id),
        }
    }

    /// Category name used by the audit journal.
    pub fn category(&self) -> &'static str {
        match self {
            PipeEvent::Message(_) => "watcher-message",
            PipeEvent::Lifecycle(event) => event.kind.as_str(),
        }
    }
}
