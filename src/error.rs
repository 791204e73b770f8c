use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Failed to spawn worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker (pid {pid}) exited before announcing its session id")]
    IdentityNotObtained { pid: u32 },

    #[error("Worker (pid {pid}) did not announce its session id within {timeout:?}")]
    IdentityTimeout { pid: u32, timeout: Duration },

    #[error("Failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: String,
        #[source]
        source: nix::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
