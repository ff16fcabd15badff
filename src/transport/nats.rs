// ABOUTME: NATS transport for whitelist change messages
// ABOUTME: Publishes with an explicit flush and opens subscriptions for watchers

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::Transport;

/// Owns a NATS client connection.
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    pub async fn connect(nats_url: &str) -> Result<Self> {
        tracing::info!("Connecting to NATS at {}", nats_url);
        let client = async_nats::connect(nats_url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", nats_url))?;
        tracing::info!("Connected to NATS successfully");
        Ok(Self { client })
    }

    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub async fn subscribe(&self, subject: String) -> Result<async_nats::Subscriber> {
        tracing::info!("Subscribing to NATS subject: {}", subject);
        self.client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;
        // publish only buffers; flush waits for the broker to take it
        self.client
            .flush()
            .await
            .with_context(|| format!("Failed to flush publish to {}", subject))?;
        Ok(())
    }
}
