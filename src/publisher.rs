// ABOUTME: UpdatePublisher - emits each logical update on the minimal and full channels
// ABOUTME: Surfaces clean transport failures separately from partial (one-channel) publishes

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::message::{ChangeMessage, Channel, MessageHeader, Topics};
use crate::transport::Transport;
use crate::whitelist::{ItemRecord, Whitelist};

/// Default bound on a single channel emission
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes change messages over an injected transport.
///
/// Every logical update is emitted twice, minimal channel first. Both
/// emissions carry the same snapshot id and timestamp.
pub struct UpdatePublisher {
    transport: Arc<dyn Transport>,
    topics: Topics,
    timeout: Duration,
}

impl UpdatePublisher {
    /// Create a publisher that sends on `topics` through `transport`.
    ///
    /// Emissions are bounded by [`DEFAULT_PUBLISH_TIMEOUT`] until
    /// [`UpdatePublisher::with_timeout`] says otherwise.
    pub fn new(transport: Arc<dyn Transport>, topics: Topics) -> Self {
        Self {
            transport,
            topics,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Publish the complete whitelist, replacing subscriber state.
    ///
    /// # Arguments
    ///
    /// * `chain` - Chain the whitelist belongs to, used as the subject token
    /// * `whitelist` - Every currently whitelisted pool
    /// * `snapshot_id` - Id the receiving side orders updates by
    /// * `timestamp` - Publication time carried by both emissions
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once the minimal and the full channel both accepted
    /// the message.
    ///
    /// # Errors
    ///
    /// - [`SyncError::TransportUnavailable`] if the minimal emission failed,
    ///   in which case nothing was delivered
    /// - [`SyncError::PartialPublish`] if only the minimal emission went out
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use serde_json::json;
    /// # use whitelist_sync::transport::RecordingTransport;
    /// # use whitelist_sync::{Topics, UpdatePublisher, Whitelist};
    /// # #[tokio::main]
    /// # async fn main() -> whitelist_sync::Result<()> {
    /// let transport = Arc::new(RecordingTransport::new());
    /// let publisher = UpdatePublisher::new(transport.clone(), Topics::default());
    ///
    /// let whitelist = Whitelist::from_values(vec![json!({"address": "0xABC", "fee": 30})])?;
    /// publisher
    ///     .publish_full("ethereum", &whitelist, 1, chrono::Utc::now())
    ///     .await?;
    ///
    /// let minimal = transport.published_json("whitelist.pools.ethereum.minimal").await;
    /// assert_eq!(minimal[0]["pools"][0], "0xabc");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn publish_full(
        &self,
        chain: &str,
        whitelist: &Whitelist,
        snapshot_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let message = ChangeMessage::full(header(chain, snapshot_id, timestamp), whitelist);
        self.publish(&message).await
    }

    /// Publish newly whitelisted records.
    pub async fn publish_add(
        &self,
        chain: &str,
        records: Vec<ItemRecord>,
        snapshot_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let message = ChangeMessage::Add {
            header: header(chain, snapshot_id, timestamp),
            records,
        };
        self.publish(&message).await
    }

    /// Publish keys that are no longer whitelisted.
    pub async fn publish_remove(
        &self,
        chain: &str,
        keys: Vec<String>,
        snapshot_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let message = ChangeMessage::Remove {
            header: header(chain, snapshot_id, timestamp),
            keys,
        };
        self.publish(&message).await
    }

    /// Emit one message on both channels.
    ///
    /// Both payloads are encoded before anything is sent, so an encoding
    /// failure never leaves a half-published update behind.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Encode`] before any emission, otherwise the same
    /// errors as [`UpdatePublisher::publish_full`].
    pub async fn publish(&self, message: &ChangeMessage) -> Result<()> {
        let kind = message.kind();
        let chain = &message.header().chain;

        let encode = |channel| {
            message
                .encode(channel)
                .map_err(|source| SyncError::Encode { kind, source })
        };
        let minimal_payload = encode(Channel::Minimal)?;
        let full_payload = encode(Channel::Full)?;

        let minimal_subject = self.topics.subject(chain, Channel::Minimal);
        if let Err(reason) = self.emit(&minimal_subject, minimal_payload).await {
            return Err(SyncError::TransportUnavailable {
                subject: minimal_subject,
                reason,
            });
        }

        let full_subject = self.topics.subject(chain, Channel::Full);
        if let Err(reason) = self.emit(&full_subject, full_payload).await {
            tracing::error!(
                "Partial publish of {} update for {} (snapshot {}): {} delivered, {} failed: {}",
                kind,
                chain,
                message.header().snapshot_id,
                minimal_subject,
                full_subject,
                reason
            );
            return Err(SyncError::PartialPublish {
                kind,
                succeeded: Channel::Minimal,
                failed: Channel::Full,
                reason,
            });
        }

        tracing::debug!(
            "Published {} update: {} pools for {} (snapshot {})",
            kind,
            message.len(),
            chain,
            message.header().snapshot_id
        );
        Ok(())
    }

    async fn emit(&self, subject: &str, payload: Vec<u8>) -> std::result::Result<(), String> {
        match tokio::time::timeout(self.timeout, self.transport.publish(subject, payload)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        }
    }
}

fn header(chain: &str, snapshot_id: i64, timestamp: DateTime<Utc>) -> MessageHeader {
    MessageHeader {
        chain: chain.to_string(),
        snapshot_id,
        timestamp,
    }
}
