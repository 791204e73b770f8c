//! Fan-out of pipeline events to HTTP subscribers.
//!
//! Each subscriber declares a [`SubscriberLevel`] deciding which records it
//! sees and in what shape. Every level also receives all lifecycle events.
//!
//! | Level           | Trigger                                  | Payload                  |
//! |-----------------|------------------------------------------|--------------------------|
//! | `status`        | assistant record                         | [`StatusPayload`]        |
//! | `summary`       | assistant record                         | [`SummaryPayload`]       |
//! | `stream`        | every record                             | the [`Record`] itself    |
//! | `stream-status` | processing/completed transition only     | [`StatusPayload`]        |
//!
//! [`Record`]: crate::record::Record

pub mod delivery;
pub mod dispatcher;
pub mod payload;
pub mod throttle;

pub use delivery::{DeliveryError, DeliveryTransport, HttpTransport};
pub use dispatcher::{Delivery, Dispatcher};
pub use payload::{Payload, StatusPayload, SummaryPayload};
pub use throttle::FailureThrottle;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verbosity a subscriber asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriberLevel {
    Status,
    Summary,
    Stream,
    StreamStatus,
}

impl SubscriberLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberLevel::Status => "status",
            SubscriberLevel::Summary => "summary",
            SubscriberLevel::Stream => "stream",
            SubscriberLevel::StreamStatus => "stream-status",
        }
    }
}

impl fmt::Display for SubscriberLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn state derived from the role of the latest record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// A user message arrived and the assistant has not answered yet.
    Processing,
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names_round_trip_through_serde() {
        for level in [
            SubscriberLevel::Status,
            SubscriberLevel::Summary,
            SubscriberLevel::Stream,
            SubscriberLevel::StreamStatus,
        ] {
            let json = serde_json::to_string(&level).unwrap();
            assert_eq!(json, format!("\"{}\"", level.as_str()));
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
