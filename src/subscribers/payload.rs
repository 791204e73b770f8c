//! Bodies posted to subscribers.

use super::SessionStatus;
use crate::events::LifecycleEvent;
use crate::record::{Message, Record};
use serde::Serialize;

/// Minimal turn notification for `status` and `stream-status` subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub status: SessionStatus,
    /// Whether the session is driven by a worker this service spawned.
    pub managed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}

/// Completed turn with latency for `summary` subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPayload {
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub status: SessionStatus,
    pub managed: bool,
    /// Seconds since the previous summary for the session, `null` for the first.
    pub response_time: Option<f64>,
    pub last_message: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Status(StatusPayload),
    Summary(SummaryPayload),
    Record(Record),
    Lifecycle(LifecycleEvent),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Status(_) => "status",
            Payload::Summary(_) => "summary",
            Payload::Record(_) => "record",
            Payload::Lifecycle(event) => event.kind.as_str(),
        }
    }
}
