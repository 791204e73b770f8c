//! Service configuration.
//!
//! Keys are camelCase so an existing `config.json` loads unchanged. Files with
//! a `.toml` extension are parsed as TOML; anything else as JSON.

pub mod loader;

pub use loader::{load_config, parse_config, validate};

use crate::subscribers::SubscriberLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipeConfig {
    /// Root of the session log tree. `~` is expanded on load.
    pub watch_dir: PathBuf,
    pub port: u16,
    pub subscribers: Vec<SubscriberConfig>,
    pub send: SendConfig,
    /// Directory holding the audit journal (`server.log`).
    pub log_dir: PathBuf,
    pub dispatch: DispatchConfig,
    pub bus_capacity: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("~/.claude/projects"),
            port: 3100,
            subscribers: Vec::new(),
            send: SendConfig::default(),
            log_dir: PathBuf::from("logs"),
            dispatch: DispatchConfig::default(),
            bus_capacity: 1024,
        }
    }
}

/// One downstream HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    pub url: String,
    pub label: String,
    pub level: SubscriberLevel,
    /// Sent verbatim as the `Authorization` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

/// Worker spawning and cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendConfig {
    pub default_allowed_tools: Vec<String>,
    pub cancel_timeout_ms: u64,
    pub identify_timeout_ms: u64,
    pub program: String,
}

impl SendConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_millis(self.identify_timeout_ms)
    }
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            default_allowed_tools: Vec::new(),
            cancel_timeout_ms: 3000,
            identify_timeout_ms: 30_000,
            program: "claude".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchConfig {
    /// Window in which repeated delivery failures to one subscriber are not logged again.
    pub failure_cooldown_secs: u64,
    /// Sessions tracked per dispatcher before the least recently used is evicted.
    pub session_capacity: usize,
}

impl DispatchConfig {
    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            failure_cooldown_secs: 60,
            session_capacity: 1024,
        }
    }
}
