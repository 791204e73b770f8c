//! Worker process management: spawning, identity reconciliation and cancellation.

pub mod cancel;
pub mod command;
pub mod output;
pub mod registry;
pub mod signal;

pub use cancel::{CancelOutcome, CancellationController};
pub use command::{SessionRequest, WorkerCommand, WorkerProgram};
pub use output::{LoggingOutputHandler, ProcessOutputHandler};
pub use registry::{ProcessRegistry, RegistryConfig};
pub use signal::{NixSignaller, Signaller};

use crate::error::Result;
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Key a managed process is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionIdentity {
    /// Generated at spawn, replaced once the worker announces its id.
    Provisional(String),
    /// The worker's own session id.
    Confirmed(String),
}

impl SessionIdentity {
    pub fn as_str(&self) -> &str {
        match self {
            SessionIdentity::Provisional(id) | SessionIdentity::Confirmed(id) => id,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, SessionIdentity::Provisional(_))
    }
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedProcessInfo {
    pub session_id: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub alive: bool,
    pub provisional: bool,
    pub resumed: bool,
}

/// Result of a successful start or resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: String,
    pub pid: u32,
}

/// Handle for signalling one managed process without holding the registry lock.
#[derive(Clone)]
pub struct ProcessRef {
    pub session_id: String,
    pub pid: u32,
    exited: Arc<AtomicBool>,
    signaller: Arc<dyn Signaller>,
}

impl ProcessRef {
    pub fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    pub fn send(&self, signal: Signal) -> Result<()> {
        self.signaller.send(self.pid, signal)
    }
}

impl std::fmt::Debug for ProcessRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRef")
            .field("session_id", &self.session_id)
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingOutputHandler;
    use super::*;

    #[test]
    fn test_identity_accessors() {
        let provisional = SessionIdentity::Provisional("session-1-2".into());
        let confirmed = SessionIdentity::Confirmed("abc".into());
        assert!(provisional.is_provisional());
        assert!(!confirmed.is_provisional());
        assert_eq!(confirmed.as_str(), "abc");
    }

    #[test]
    fn test_managed_info_serializes_camel_case() {
        let info = ManagedProcessInfo {
            session_id: "abc".into(),
            pid: 42,
            started_at: Utc::now(),
            alive: true,
            provisional: false,
            resumed: true,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["sessionId"], "abc");
        assert_eq!(value["pid"], 42);
        assert!(value.get("startedAt").is_some());
    }

    #[tokio::test]
    async fn test_recording_handler_captures_stderr() {
        let handler = RecordingOutputHandler::default();
        handler.on_stderr("warning").await;
        assert_eq!(handler.stderr(), vec!["warning"]);
    }
}
