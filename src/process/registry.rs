//! Registry of worker processes spawned by this service.
//!
//! ## Identity reconciliation
//! ```text
//! spawn ──► Provisional("session-<millis>-<pid>") ──► stdout system/init ──► Confirmed(<id>)
//!                 │                                                            │
//!                 └──────────────── exit: entry removed, process-exit ◄────────┘
//! ```
//!
//! ## Rules
//! - A new worker is registered under its placeholder before any output is
//!   read, so it can be cancelled right away.
//! - Re-keying removes the provisional entry and inserts the confirmed one
//!   under a single write lock.
//! - Every entry carries a generation; exit cleanup only removes the entry if
//!   the generation under that key is still its own, so a resumed process is
//!   never removed by its predecessor's exit.
//! - Resuming a session whose previous process is still alive terminates the
//!   previous process once the replacement has spawned.

use super::command::{
    new_session_command, resume_session_command, SessionRequest, WorkerCommand, WorkerProgram,
};
use super::output::ProcessOutputHandler;
use super::signal::{NixSignaller, Signaller};
use super::{ManagedProcessInfo, ProcessRef, SessionIdentity, StartedSession};
use crate::error::{Error, Result};
use crate::events::{EventBus, LifecycleEvent, LifecycleKind, PipeEvent};
use crate::record::parse_init_announcement;
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};

/// Registry settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub program: WorkerProgram,
    /// How long `start_new_session` waits for the worker to announce its id.
    pub identify_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            program: WorkerProgram::default(),
            identify_timeout: Duration::from_secs(30),
        }
    }
}

/// One live worker.
struct ManagedProcess {
    identity: SessionIdentity,
    pid: u32,
    started_at: DateTime<Utc>,
    resumed: bool,
    generation: u64,
    exited: Arc<AtomicBool>,
}

impl ManagedProcess {
    fn info(&self) -> ManagedProcessInfo {
        ManagedProcessInfo {
            session_id: self.identity.as_str().to_string(),
            pid: self.pid,
            started_at: self.started_at,
            alive: !self.exited.load(Ordering::SeqCst),
            provisional: self.identity.is_provisional(),
            resumed: self.resumed,
        }
    }
}

/// State owned by the task that watches one worker.
struct Monitor {
    key: SessionIdentity,
    pid: u32,
    generation: u64,
    exited: Arc<AtomicBool>,
    handler: Arc<dyn ProcessOutputHandler>,
    identity_tx: Option<oneshot::Sender<String>>,
}

pub struct ProcessRegistry {
    entries: RwLock<HashMap<String, ManagedProcess>>,
    next_generation: AtomicU64,
    bus: EventBus,
    signaller: Arc<dyn Signaller>,
    config: RegistryConfig,
}

impl ProcessRegistry {
    pub fn new(config: RegistryConfig, bus: EventBus) -> Arc<Self> {
        Self::with_signaller(config, bus, Arc::new(NixSignaller))
    }

    pub fn with_signaller(
        config: RegistryConfig,
        bus: EventBus,
        signaller: Arc<dyn Signaller>,
    ) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            bus,
            signaller,
            config,
        })
    }

    /// Start a fresh session and wait until the worker announces its id.
    pub async fn start_new_session(
        self: &Arc<Self>,
        request: SessionRequest,
        handler: Arc<dyn ProcessOutputHandler>,
    ) -> Result<StartedSession> {
        let command = new_session_command(&self.config.program, &request);
        let child = match Self::spawn(&command) {
            Ok(child) => child,
            Err(e) => {
                let placeholder = placeholder_id(0);
                self.publish(
                    LifecycleEvent::new(LifecycleKind::SessionError, placeholder, 0)
                        .with_error(e.to_string()),
                );
                return Err(e);
            }
        };

        let pid = child.id().unwrap_or(0);
        let placeholder = placeholder_id(pid);
        let (generation, exited) = self
            .register(SessionIdentity::Provisional(placeholder.clone()), pid, false)
            .await;

        info!(
            "Started new session: placeholder={}, pid={}",
            placeholder, pid
        );
        self.publish(
            LifecycleEvent::new(LifecycleKind::SessionStarted, &placeholder, pid)
                .with_resumed(false),
        );

        let (identity_tx, identity_rx) = oneshot::channel();
        let monitor = Monitor {
            key: SessionIdentity::Provisional(placeholder.clone()),
            pid,
            generation,
            exited,
            handler,
            identity_tx: Some(identity_tx),
        };
        tokio::spawn(Arc::clone(self).monitor(child, monitor));

        match tokio::time::timeout(self.config.identify_timeout, identity_rx).await {
            Ok(Ok(session_id)) => Ok(StartedSession { session_id, pid }),
            Ok(Err(_)) => Err(Error::IdentityNotObtained { pid }),
            Err(_) => {
                warn!(
                    "Worker pid={} did not announce a session id within {:?}",
                    pid, self.config.identify_timeout
                );
                self.publish(LifecycleEvent::new(
                    LifecycleKind::SessionTimeout,
                    placeholder,
                    pid,
                ));
                Err(Error::IdentityTimeout {
                    pid,
                    timeout: self.config.identify_timeout,
                })
            }
        }
    }

    /// Continue `session_id` in a new worker process.
    pub async fn send_to_session(
        self: &Arc<Self>,
        session_id: &str,
        request: SessionRequest,
        handler: Arc<dyn ProcessOutputHandler>,
    ) -> Result<StartedSession> {
        let command = resume_session_command(&self.config.program, session_id, &request);
        let child = match Self::spawn(&command) {
            Ok(child) => child,
            Err(e) => {
                self.publish(
                    LifecycleEvent::new(LifecycleKind::SessionError, session_id, 0)
                        .with_error(e.to_string())
                        .with_resumed(true),
                );
                return Err(e);
            }
        };

        let pid = child.id().unwrap_or(0);
        let identity = SessionIdentity::Confirmed(session_id.to_string());
        let (generation, exited) = self.register(identity.clone(), pid, true).await;

        info!("Resumed session: sessionId={}, pid={}", session_id, pid);
        self.publish(
            LifecycleEvent::new(LifecycleKind::SessionStarted, session_id, pid).with_resumed(true),
        );

        let monitor = Monitor {
            key: identity,
            pid,
            generation,
            exited,
            handler,
            identity_tx: None,
        };
        tokio::spawn(Arc::clone(self).monitor(child, monitor));

        Ok(StartedSession {
            session_id: session_id.to_string(),
            pid,
        })
    }

    /// Snapshot of all live entries, oldest first.
    pub async fn list(&self) -> Vec<ManagedProcessInfo> {
        let entries = self.entries.read().await;
        let mut list: Vec<_> = entries.values().map(ManagedProcess::info).collect();
        list.sort_by_key(|info| info.started_at);
        list
    }

    pub async fn get(&self, session_id: &str) -> Option<ManagedProcessInfo> {
        self.entries.read().await.get(session_id).map(ManagedProcess::info)
    }

    pub async fn is_managed(&self, session_id: &str) -> bool {
        self.entries.read().await.contains_key(session_id)
    }

    /// Borrow a signalling reference to the live entry for `session_id`.
    pub async fn process_ref(&self, session_id: &str) -> Option<ProcessRef> {
        let entries = self.entries.read().await;
        entries.get(session_id).map(|entry| ProcessRef {
            session_id: session_id.to_string(),
            pid: entry.pid,
            exited: Arc::clone(&entry.exited),
            signaller: Arc::clone(&self.signaller),
        })
    }

    pub(crate) fn publish(&self, event: LifecycleEvent) {
        self.bus.publish(PipeEvent::Lifecycle(event));
    }

    fn spawn(command: &WorkerCommand) -> Result<Child> {
        debug!("Spawning worker: {}", command.display());

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn().map_err(|source| Error::Spawn {
            program: command.program.clone(),
            source,
        })
    }

    /// Insert an entry, replacing (and terminating) any live one under the same key.
    async fn register(
        &self,
        identity: SessionIdentity,
        pid: u32,
        resumed: bool,
    ) -> (u64, Arc<AtomicBool>) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let exited = Arc::new(AtomicBool::new(false));
        let key = identity.as_str().to_string();
        let entry = ManagedProcess {
            identity,
            pid,
            started_at: Utc::now(),
            resumed,
            generation,
            exited: Arc::clone(&exited),
        };

        let previous = self.entries.write().await.insert(key.clone(), entry);
        if let Some(previous) = previous {
            self.retire(&key, previous);
        }

        (generation, exited)
    }

    fn retire(&self, key: &str, previous: ManagedProcess) {
        if previous.exited.load(Ordering::SeqCst) {
            return;
        }
        warn!(
            "Session {} already had a live process (pid={}), terminating it",
            key, previous.pid
        );
        if let Err(e) = self.signaller.send(previous.pid, Signal::SIGTERM) {
            warn!("{}", e);
        }
    }

    /// Re-key a provisional entry to its announced id.
    async fn confirm(&self, placeholder: &str, session_id: &str, generation: u64) -> bool {
        let mut entries = self.entries.write().await;
        if entries.get(placeholder).map(|e| e.generation) != Some(generation) {
            return false;
        }
        let Some(mut entry) = entries.remove(placeholder) else {
            return false;
        };
        entry.identity = SessionIdentity::Confirmed(session_id.to_string());
        let previous = entries.insert(session_id.to_string(), entry);
        drop(entries);

        if let Some(previous) = previous {
            self.retire(session_id, previous);
        }
        true
    }

    async fn remove(&self, key: &str, generation: u64) -> bool {
        let mut entries = self.entries.write().await;
        if entries.get(key).map(|e| e.generation) == Some(generation) {
            entries.remove(key);
            true
        } else {
            false
        }
    }

    async fn monitor(self: Arc<Self>, mut child: Child, mut monitor: Monitor) {
        let stderr_task = child.stderr.take().map(|stderr| {
            let handler = Arc::clone(&monitor.handler);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                while let Ok(Some(line)) = read_lossy_line(&mut reader, &mut buf).await {
                    handler.on_stderr(&line).await;
                }
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                match read_lossy_line(&mut reader, &mut buf).await {
                    Ok(Some(line)) => {
                        self.observe_stdout_line(&mut monitor, &line).await;
                        monitor.handler.on_stdout(&line).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read stdout of pid={}: {}", monitor.pid, e);
                        break;
                    }
                }
            }
        }

        let status = child.wait().await;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }
        monitor.exited.store(true, Ordering::SeqCst);

        let session_id = monitor.key.as_str().to_string();
        self.remove(&session_id, monitor.generation).await;
        // Rejects a still-pending start once the entry is gone.
        drop(monitor.identity_tx.take());

        let mut event = LifecycleEvent::new(LifecycleKind::ProcessExit, &session_id, monitor.pid);
        let (code, signal) = match &status {
            Ok(status) => (status.code(), status.signal().and_then(signal_name)),
            Err(e) => {
                event = event.with_error(e.to_string());
                (None, None)
            }
        };
        info!(
            "Process exited: sessionId={}, pid={}, code={:?}, signal={:?}",
            session_id, monitor.pid, code, signal
        );
        self.publish(event.with_exit(code, signal.clone()));
        monitor.handler.on_exit(code, signal.as_deref()).await;
    }

    async fn observe_stdout_line(&self, monitor: &mut Monitor, line: &str) {
        let SessionIdentity::Provisional(placeholder) = &monitor.key else {
            return;
        };
        let Some(session_id) = parse_init_announcement(line) else {
            return;
        };

        let placeholder = placeholder.clone();
        if !self.confirm(&placeholder, &session_id, monitor.generation).await {
            debug!("Entry {} vanished before confirmation", placeholder);
        }
        info!(
            "Session identified: {} -> {} (pid={})",
            placeholder, session_id, monitor.pid
        );
        monitor.key = SessionIdentity::Confirmed(session_id.clone());
        self.publish(LifecycleEvent::new(
            LifecycleKind::SessionIdentified,
            &session_id,
            monitor.pid,
        ));
        if let Some(tx) = monitor.identity_tx.take() {
            let _ = tx.send(session_id);
        }
    }
}

/// Read one line, replacing invalid UTF-8 instead of failing on it.
async fn read_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

fn placeholder_id(pid: u32) -> String {
    format!("session-{}-{}", Utc::now().timestamp_millis(), pid)
}

fn signal_name(signal: i32) -> Option<String> {
    Signal::try_from(signal)
        .ok()
        .map(|signal| signal.as_str().to_string())
}
