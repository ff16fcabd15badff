// ABOUTME: In-memory SnapshotStore for tests and dry runs
// ABOUTME: Mirrors the PostgreSQL store's idempotent append and counter semantics

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{Snapshot, SnapshotStore};
use crate::error::{Result, SyncError};

#[derive(Default)]
struct StoreState {
    /// Snapshots per chain, ordered by snapshot id
    snapshots: HashMap<String, BTreeMap<i64, Snapshot>>,
    /// Last allocated snapshot id per chain
    counters: HashMap<String, i64>,
}

/// Keeps every appended snapshot in memory.
///
/// Loads and appends can be made to fail on demand so callers can exercise
/// their store-unavailable paths.
#[derive(Default)]
pub struct MemorySnapshotStore {
    state: Mutex<StoreState>,
    fail_loads: AtomicBool,
    fail_appends: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Number of snapshots stored for a chain.
    pub async fn snapshot_count(&self, chain: &str) -> usize {
        let state = self.state.lock().await;
        state.snapshots.get(chain).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn load_latest(&self, chain: &str) -> Result<Option<Snapshot>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(SyncError::store("load_latest", "memory store marked unavailable"));
        }

        let state = self.state.lock().await;
        Ok(state
            .snapshots
            .get(chain)
            .and_then(|snapshots| snapshots.values().next_back())
            .cloned())
    }

    async fn allocate_snapshot_id(&self, chain: &str, floor: Option<i64>) -> Result<i64> {
        let mut state = self.state.lock().await;
        let counter = state.counters.entry(chain.to_string()).or_insert(0);
        *counter = (*counter).max(floor.unwrap_or(0)) + 1;
        Ok(*counter)
    }

    async fn append(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(SyncError::store("append", "memory store marked unavailable"));
        }

        let mut state = self.state.lock().await;
        let snapshots = state.snapshots.entry(snapshot.chain.clone()).or_default();
        match snapshots.get_mut(&snapshot.snapshot_id) {
            Some(existing) => {
                for record in snapshot.items.records() {
                    if !existing.items.contains_key(&record.key) {
                        existing.items.insert(record.clone());
                    }
                }
            }
            None => {
                snapshots.insert(snapshot.snapshot_id, snapshot.clone());
            }
        }
        Ok(())
    }
}
