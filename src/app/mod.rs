//! Application module
//!
//! Command-line level concerns: logging setup, wiring the pipeline together,
//! and fatal error reporting.

pub mod config;
pub mod error_handling;
pub mod logging;
pub mod runtime;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
pub use runtime::{run_server, run_tail, shutdown_signal, Pipeline};
