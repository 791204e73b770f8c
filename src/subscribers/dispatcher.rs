//! Per-subscriber delivery decisions.
//!
//! The dispatcher is the only owner of subscriber session state and runs as a
//! single task draining the event bus. Deciding what to send is synchronous
//! ([`Dispatcher::plan`]); sending is spawned so a slow or dead subscriber
//! never holds up the loop or the other subscribers.

use super::payload::{Payload, StatusPayload, SummaryPayload};
use super::throttle::FailureThrottle;
use super::{DeliveryTransport, SessionStatus, SubscriberLevel};
use crate::config::{DispatchConfig, SubscriberConfig};
use crate::events::PipeEvent;
use crate::process::ProcessRegistry;
use crate::record::{Record, Role};
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One payload bound for one subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subscriber: Arc<SubscriberConfig>,
    pub payload: Payload,
}

#[derive(Debug, Default)]
struct SessionState {
    status: Option<SessionStatus>,
    last_summary_at: Option<DateTime<Utc>>,
}

type SessionKey = (usize, Option<String>);

pub struct Dispatcher {
    subscribers: Vec<Arc<SubscriberConfig>>,
    sessions: LruCache<SessionKey, SessionState>,
    registry: Option<Arc<ProcessRegistry>>,
    transport: Arc<dyn DeliveryTransport>,
    throttle: Arc<Mutex<FailureThrottle>>,
}

impl Dispatcher {
    pub fn new(
        subscribers: Vec<SubscriberConfig>,
        transport: Arc<dyn DeliveryTransport>,
        config: &DispatchConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.session_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            subscribers: subscribers.into_iter().map(Arc::new).collect(),
            sessions: LruCache::new(capacity),
            registry: None,
            transport,
            throttle: Arc::new(Mutex::new(FailureThrottle::new(
                config.failure_cooldown(),
            ))),
        }
    }

    /// Use `registry` to tag status payloads with whether the session is managed.
    pub fn with_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Decide what every subscriber receives for `event`, updating session state.
    pub fn plan(&mut self, event: &PipeEvent, managed: bool) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        for index in 0..self.subscribers.len() {
            let subscriber = Arc::clone(&self.subscribers[index]);
            let payload = match event {
                PipeEvent::Lifecycle(lifecycle) => Some(Payload::Lifecycle(lifecycle.clone())),
                PipeEvent::Message(record) => {
                    self.plan_record(index, subscriber.level, record, managed)
                }
            };
            if let Some(payload) = payload {
                deliveries.push(Delivery {
                    subscriber,
                    payload,
                });
            }
        }
        deliveries
    }

    fn plan_record(
        &mut self,
        index: usize,
        level: SubscriberLevel,
        record: &Record,
        managed: bool,
    ) -> Option<Payload> {
        match level {
            SubscriberLevel::Stream => Some(Payload::Record(record.clone())),
            SubscriberLevel::Status => record.is_assistant().then(|| {
                Payload::Status(StatusPayload {
                    session_id: record.session_id.clone(),
                    timestamp: record.timestamp.clone(),
                    status: SessionStatus::Completed,
                    managed,
                    last_message: None,
                })
            }),
            SubscriberLevel::Summary => {
                if !record.is_assistant() {
                    return None;
                }
                let at = record_time(record);
                let state = self.state(index, record);
                let response_time = state.last_summary_at.map(|prev| seconds_between(prev, at));
                state.last_summary_at = Some(at);
                Some(Payload::Summary(SummaryPayload {
                    session_id: record.session_id.clone(),
                    timestamp: record.timestamp.clone(),
                    status: SessionStatus::Completed,
                    managed,
                    response_time,
                    last_message: record.message.clone(),
                }))
            }
            SubscriberLevel::StreamStatus => {
                let next = match record.role()? {
                    Role::User => SessionStatus::Processing,
                    Role::Assistant => SessionStatus::Completed,
                };
                let state = self.state(index, record);
                if state.status == Some(next) {
                    return None;
                }
                state.status = Some(next);
                Some(Payload::Status(StatusPayload {
                    session_id: record.session_id.clone(),
                    timestamp: record.timestamp.clone(),
                    status: next,
                    managed,
                    last_message: Some(record.message.clone()),
                }))
            }
        }
    }

    fn state(&mut self, index: usize, record: &Record) -> &mut SessionState {
        self.sessions
            .get_or_insert_mut((index, record.session_id.clone()), SessionState::default)
    }

    /// Plan and send everything `event` produces. Returns the number of deliveries started.
    pub async fn handle(&mut self, event: &PipeEvent) -> usize {
        if self.subscribers.is_empty() {
            return 0;
        }
        let managed = self.is_managed(event).await;
        let deliveries = self.plan(event, managed);
        let count = deliveries.len();
        for delivery in deliveries {
            self.send(delivery);
        }
        count
    }

    async fn is_managed(&self, event: &PipeEvent) -> bool {
        let (Some(registry), PipeEvent::Message(record)) = (&self.registry, event) else {
            return false;
        };
        match &record.session_id {
            Some(session_id) => registry.is_managed(session_id).await,
            None => false,
        }
    }

    fn send(&self, delivery: Delivery) {
        let transport = Arc::clone(&self.transport);
        let throttle = Arc::clone(&self.throttle);
        tokio::spawn(async move {
            let subscriber = &delivery.subscriber;
            let result = transport.deliver(subscriber, &delivery.payload).await;
            let mut throttle = throttle.lock().unwrap_or_else(PoisonError::into_inner);
            match result {
                Ok(()) => {
                    debug!(
                        "Delivered {} to {} ({})",
                        delivery.payload.kind(),
                        subscriber.label,
                        subscriber.url
                    );
                    throttle.record_success(&subscriber.label, &subscriber.url);
                }
                Err(e) => match throttle.report(&subscriber.label, &subscriber.url) {
                    Some(0) => warn!(
                        "Failed to deliver to {} ({}): {}",
                        subscriber.label, subscriber.url, e
                    ),
                    Some(suppressed) => warn!(
                        "Failed to deliver to {} ({}): {} ({} similar failures suppressed)",
                        subscriber.label, subscriber.url, e, suppressed
                    ),
                    None => debug!("Suppressed delivery failure for {}: {}", subscriber.label, e),
                },
            }
        });
    }

    /// Drain `rx` until the bus closes.
    pub fn spawn(mut self, mut rx: broadcast::Receiver<PipeEvent>) -> JoinHandle<()> {
        if self.subscribers.is_empty() {
            info!("No subscribers configured");
        } else {
            for subscriber in &self.subscribers {
                info!(
                    "Subscriber {} at {} (level {})",
                    subscriber.label, subscriber.url, subscriber.level
                );
            }
        }

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        self.handle(&event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Dispatcher fell behind, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Dispatcher stopped");
        })
    }
}

fn record_time(record: &Record) -> DateTime<Utc> {
    record
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let millis = (later - earlier).num_milliseconds() as f64;
    (millis / 10.0).round() / 100.0
}
