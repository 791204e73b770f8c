//! Caller-supplied sinks for worker output.

use async_trait::async_trait;

/// Receives every stdout/stderr line of a worker and its exit.
#[async_trait]
pub trait ProcessOutputHandler: Send + Sync {
    async fn on_stdout(&self, line: &str);

    async fn on_stderr(&self, line: &str);

    async fn on_exit(&self, code: Option<i32>, signal: Option<&str>);
}

/// Default handler that logs output.
pub struct LoggingOutputHandler {
    prefix: String,
}

impl LoggingOutputHandler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl ProcessOutputHandler for LoggingOutputHandler {
    async fn on_stdout(&self, line: &str) {
        tracing::debug!("{}: stdout: {}", self.prefix, line);
    }

    async fn on_stderr(&self, line: &str) {
        tracing::warn!("{}: stderr: {}", self.prefix, line);
    }

    async fn on_exit(&self, code: Option<i32>, signal: Option<&str>) {
        tracing::info!(
            "{}: process exited: code={:?}, signal={:?}",
            self.prefix,
            code,
            signal
        );
    }
}
