// ABOUTME: Pub/sub transport abstraction used by the update publisher
// ABOUTME: NATS-backed implementation plus an in-memory recorder for tests

pub mod memory;
pub mod nats;

use async_trait::async_trait;

pub use memory::RecordingTransport;
pub use nats::NatsTransport;

/// A connected pub/sub client that can deliver one payload to one subject.
///
/// `publish` returns only once the payload has been handed to the broker.
/// Timeouts are applied by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> anyhow::Result<()>;
}
