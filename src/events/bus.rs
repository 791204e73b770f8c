//! Broadcast channel carrying [`PipeEvent`]s.
//!
//! Publishing never blocks. Receivers that fall behind observe
//! `RecvError::Lagged(n)` and skip the `n` oldest events; there is no replay.

use super::PipeEvent;
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<PipeEvent>,
}

impl EventBus {
    /// Creates a bus holding at most `capacity` undelivered events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes to every live receiver. Dropped when nobody listens.
    pub fn publish(&self, event: PipeEvent) {
        let _ = self.tx.send(event);
    }

    /// Receives events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PipeEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LifecycleEvent, LifecycleKind};

    #[tokio::test]
    async fn test_subscribers_see_events_published_after_subscribing() {
        let bus = EventBus::new(8);
        bus.publish(PipeEvent::Lifecycle(LifecycleEvent::new(
            LifecycleKind::SessionStarted,
            "early",
            1,
        )));

        let mut rx = bus.subscribe();
        bus.publish(PipeEvent::Lifecycle(LifecycleEvent::new(
            LifecycleKind::ProcessExit,
            "late",
            2,
        )));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id(), Some("late"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_receivers_does_not_fail() {
        let bus = EventBus::new(0);
        assert_eq!(bus.receiver_count(), 0);
        bus.publish(PipeEvent::Message(Default::default()));
    }
}
