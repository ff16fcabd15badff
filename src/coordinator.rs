// ABOUTME: SyncCoordinator - runs one load/diff/publish/persist cycle per chain
// ABOUTME: Serializes cycles per chain and reports what was published

use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::error::{Result, SyncError};
use crate::message::MessageKind;
use crate::publisher::UpdatePublisher;
use crate::store::{Snapshot, SnapshotStore};
use crate::utils::validate_chain_name;
use crate::whitelist::{diff, Whitelist};

/// How a cycle brought subscribers up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// The whole whitelist was sent as one Full message
    Full,
    /// Only added and removed items were sent
    Differential,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Differential => f.write_str("differential"),
        }
    }
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub chain: String,
    pub snapshot_id: i64,
    /// Items in the whitelist that was synced
    pub total: usize,
    /// Items announced as added (always 0 in full mode)
    pub added: usize,
    /// Items announced as removed (always 0 in full mode)
    pub removed: usize,
    pub mode: SyncMode,
}

/// Drives sync cycles against a snapshot store and a publisher.
///
/// Only one cycle runs at a time for a given chain. Cycles for different
/// chains proceed independently.
pub struct SyncCoordinator {
    store: Arc<dyn SnapshotStore>,
    publisher: UpdatePublisher,
    chain_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn SnapshotStore>, publisher: UpdatePublisher) -> Self {
        Self {
            store,
            publisher,
            chain_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn publisher(&self) -> &UpdatePublisher {
        &self.publisher
    }

    /// Validate raw pool objects, then sync them.
    pub async fn sync_values(
        &self,
        chain: &str,
        values: Vec<serde_json::Value>,
        force_full: bool,
    ) -> Result<UpdateResult> {
        let whitelist = Whitelist::from_values(values)?;
        self.sync(chain, whitelist, force_full).await
    }

    /// Bring subscribers of `chain` up to date with `whitelist`.
    ///
    /// Sends a Full message on the first publish for the chain or when
    /// `force_full` is set, otherwise only the differences from the last
    /// stored snapshot. The snapshot is stored only after every message
    /// went out.
    pub async fn sync(
        &self,
        chain: &str,
        whitelist: Whitelist,
        force_full: bool,
    ) -> Result<UpdateResult> {
        validate_chain_name(chain).map_err(|e| SyncError::InvalidChain {
            chain: chain.to_string(),
            reason: e.to_string(),
        })?;

        let lock = self.chain_lock(chain).await;
        let result = {
            let _guard = lock.lock().await;
            let span = tracing::info_span!("sync", chain = %chain);
            self.run_cycle(chain, whitelist, force_full)
                .instrument(span)
                .await
        };
        self.release_chain_lock(chain, lock).await;
        result
    }

    async fn chain_lock(&self, chain: &str) -> Arc<Mutex<()>> {
        let mut locks = self.chain_locks.lock().await;
        locks
            .entry(chain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the chain's lock entry once no other cycle holds or awaits it,
    /// so chains that stop syncing do not accumulate.
    async fn release_chain_lock(&self, chain: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.chain_locks.lock().await;
        // one reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(chain);
        }
    }

    #[cfg(test)]
    async fn tracked_chains(&self) -> usize {
        self.chain_locks.lock().await.len()
    }

    async fn run_cycle(
        &self,
        chain: &str,
        whitelist: Whitelist,
        force_full: bool,
    ) -> Result<UpdateResult> {
        let previous = self.store.load_latest(chain).await?;
        let last_id = previous.as_ref().map(|snapshot| snapshot.snapshot_id);

        let mode = if force_full || previous.is_none() {
            SyncMode::Full
        } else {
            SyncMode::Differential
        };

        let snapshot_id = self.store.allocate_snapshot_id(chain, last_id).await?;
        let timestamp = Utc::now();

        let mut result = UpdateResult {
            chain: chain.to_string(),
            snapshot_id,
            total: whitelist.len(),
            added: 0,
            removed: 0,
            mode,
        };

        match (mode, previous) {
            (SyncMode::Differential, Some(previous)) => {
                let changes = diff(&previous.items, &whitelist);
                result.added = changes.added.len();
                result.removed = changes.removed.len();

                if changes.is_empty() {
                    tracing::info!(
                        "No whitelist changes for {} since snapshot {}",
                        chain,
                        previous.snapshot_id
                    );
                }

                let mut published = Vec::new();
                if !changes.added.is_empty() {
                    self.publisher
                        .publish_add(chain, changes.added, snapshot_id, timestamp)
                        .await?;
                    published.push(MessageKind::Add);
                }
                if !changes.removed.is_empty() {
                    if let Err(e) = self
                        .publisher
                        .publish_remove(chain, changes.removed, snapshot_id, timestamp)
                        .await
                    {
                        return Err(if published.is_empty() {
                            e
                        } else {
                            SyncError::IncompleteCycle {
                                published,
                                source: Box::new(e),
                            }
                        });
                    }
                }
            }
            _ => {
                self.publisher
                    .publish_full(chain, &whitelist, snapshot_id, timestamp)
                    .await?;
            }
        }

        let snapshot = Snapshot {
            chain: chain.to_string(),
            snapshot_id,
            items: whitelist,
            published_at: timestamp,
        };
        if let Err(e) = self.store.append(&snapshot).await {
            tracing::warn!(
                "Published snapshot {} for {} but could not store it: {}",
                snapshot_id,
                chain,
                e
            );
            return Err(SyncError::SnapshotNotPersisted {
                result,
                reason: e.to_string(),
            });
        }

        tracing::info!(
            "Synced {} ({} mode): snapshot {}, {} pools, +{} -{}",
            chain,
            result.mode,
            result.snapshot_id,
            result.total,
            result.added,
            result.removed
        );
        Ok(result)
    }
}
