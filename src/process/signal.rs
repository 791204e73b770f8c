//! Signal delivery to worker processes.

use crate::error::{Error, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Sends a signal to a process by pid.
pub trait Signaller: Send + Sync {
    fn send(&self, pid: u32, signal: Signal) -> Result<()>;
}

/// Delivers signals with `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignaller;

impl Signaller for NixSignaller {
    fn send(&self, pid: u32, signal: Signal) -> Result<()> {
        kill(Pid::from_raw(pid as i32), signal).map_err(|source| Error::Signal {
            pid,
            signal: signal.as_str().to_string(),
            source,
        })
    }
}
