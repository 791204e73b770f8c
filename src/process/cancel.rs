//! Two-phase cancellation: interrupt now, terminate after a grace period.

use super::registry::ProcessRegistry;
use super::ProcessRef;
use crate::events::{LifecycleEvent, LifecycleKind};
use nix::sys::signal::Signal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a cancel request did. Never reports that the process has exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CancelOutcome {
    #[serde(rename_all = "camelCase")]
    Initiated { session_id: String, pid: u32 },
    NotFound,
}

pub struct CancellationController {
    registry: Arc<ProcessRegistry>,
    grace: Duration,
}

impl CancellationController {
    pub fn new(registry: Arc<ProcessRegistry>, grace: Duration) -> Self {
        Self { registry, grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub async fn cancel(&self, session_id: &str) -> CancelOutcome {
        self.cancel_with_grace(session_id, self.grace).await
    }

    /// Send SIGINT to the live worker for `session_id` and arm a SIGTERM
    /// fallback that fires once after `grace` if the worker is still running.
    pub async fn cancel_with_grace(&self, session_id: &str, grace: Duration) -> CancelOutcome {
        let Some(process) = self.registry.process_ref(session_id).await else {
            debug!("Cancel requested for unknown session {}", session_id);
            return CancelOutcome::NotFound;
        };

        info!(
            "Cancelling session {} (pid={}), grace={:?}",
            session_id, process.pid, grace
        );
        deliver(&process, Signal::SIGINT);
        self.registry.publish(LifecycleEvent::new(
            LifecycleKind::CancelInitiated,
            session_id,
            process.pid,
        ));

        let outcome = CancelOutcome::Initiated {
            session_id: session_id.to_string(),
            pid: process.pid,
        };

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if process.is_alive() {
                warn!(
                    "Session {} (pid={}) still running after {:?}, sending SIGTERM",
                    process.session_id, process.pid, grace
                );
                deliver(&process, Signal::SIGTERM);
            }
        });

        outcome
    }
}

fn deliver(process: &ProcessRef, signal: Signal) {
    if let Err(e) = process.send(signal) {
        warn!("{}", e);
    }
}
