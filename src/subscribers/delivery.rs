//! Outbound transport for subscriber deliveries.

use super::Payload;
use crate::config::SubscriberConfig;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}")]
    Status { status: u16 },
}

/// Sends one payload to one subscriber. No retries.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(
        &self,
        subscriber: &SubscriberConfig,
        payload: &Payload,
    ) -> Result<(), DeliveryError>;
}

/// JSON POST over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn deliver(
        &self,
        subscriber: &SubscriberConfig,
        payload: &Payload,
    ) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&subscriber.url).json(payload);
        if let Some(authorization) = &subscriber.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
            })
        }
    }
}
