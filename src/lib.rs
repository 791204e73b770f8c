//! # claude-pipe
//!
//! Turns Claude session logs into a live event stream and fans it out.
//!
//! ```text
//! ~/.claude/projects/**/*.jsonl ──► LogTailer ──┐
//!                                               ├──► EventBus ──► Dispatcher ──► HTTP subscribers
//! claude workers ─► ProcessRegistry ────────────┘          ├────► websocket clients
//!                        ▲                                  └────► audit journal
//!                        └── CancellationController
//! ```
//!
//! ## Modules
//!
//! - `record` - Parsed session log lines
//! - `watcher` - Incremental tailing of the log tree
//! - `events` - Event types and the broadcast bus
//! - `process` - Worker spawning, identity reconciliation and cancellation
//! - `subscribers` - Level-based delivery to HTTP subscribers
//! - `config` - Service configuration
//! - `api` - HTTP and websocket surface
//! - `journal` - Audit log of every event
//! - `app` - Logging setup and runtime wiring for the binary

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod journal;
pub mod process;
pub mod record;
pub mod subscribers;
pub mod watcher;

pub use error::{Error, Result};
