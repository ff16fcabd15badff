// ABOUTME: Error taxonomy for whitelist synchronization cycles
// ABOUTME: Distinguishes clean failures from partial-publish and unpersisted states

use thiserror::Error;

use crate::coordinator::UpdateResult;
use crate::message::{Channel, MessageKind};

pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by a sync cycle.
///
/// Variants that leave subscribers and the store in a state that needs
/// attention report `true` from [`SyncError::requires_full_resync`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// An emission failed before anything was delivered for this update.
    #[error("transport unavailable publishing to {subject}: {reason}")]
    TransportUnavailable { subject: String, reason: String },

    /// The snapshot store could not be reached or timed out.
    #[error("snapshot store unavailable during {operation}: {reason}")]
    StoreUnavailable {
        operation: &'static str,
        reason: String,
    },

    /// One channel received the update, the other did not.
    #[error("partial publish of {kind} update: {succeeded} channel delivered, {failed} channel failed: {reason}")]
    PartialPublish {
        kind: MessageKind,
        succeeded: Channel,
        failed: Channel,
        reason: String,
    },

    /// A whitelist entry failed validation at ingestion.
    #[error("malformed whitelist entry at index {index}: {reason}")]
    MalformedInput { index: usize, reason: String },

    /// The chain name cannot be used as a topic subject token.
    #[error("invalid chain name '{chain}': {reason}")]
    InvalidChain { chain: String, reason: String },

    /// Earlier updates of the cycle were delivered before a later one failed.
    #[error("cycle incomplete after publishing {published:?}: {source}")]
    IncompleteCycle {
        published: Vec<MessageKind>,
        #[source]
        source: Box<SyncError>,
    },

    /// Every message was delivered but the snapshot was not stored.
    #[error("published snapshot {} for {} but failed to persist it: {reason}", .result.snapshot_id, .result.chain)]
    SnapshotNotPersisted {
        result: UpdateResult,
        reason: String,
    },

    #[error("failed to encode {kind} payload: {source}")]
    Encode {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    pub(crate) fn store(operation: &'static str, reason: impl ToString) -> Self {
        SyncError::StoreUnavailable {
            operation,
            reason: reason.to_string(),
        }
    }

    /// Whether subscribers may now disagree with the store or with each
    /// other. Callers should follow up with a forced full sync.
    pub fn requires_full_resync(&self) -> bool {
        matches!(
            self,
            SyncError::PartialPublish { .. }
                | SyncError::IncompleteCycle { .. }
                | SyncError::SnapshotNotPersisted { .. }
        )
    }
}
