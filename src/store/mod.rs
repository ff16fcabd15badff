// ABOUTME: Snapshot persistence contract for published whitelists
// ABOUTME: Defines the SnapshotStore trait and its PostgreSQL and in-memory backends

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::whitelist::Whitelist;

pub use memory::MemorySnapshotStore;
pub use postgres::PostgresSnapshotStore;

/// A whitelist as it was published at `snapshot_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub chain: String,
    pub snapshot_id: i64,
    pub items: Whitelist,
    pub published_at: DateTime<Utc>,
}

/// Storage for the most recently published whitelist of each chain.
///
/// Snapshots are append-only. Implementations must make `append` idempotent
/// for a repeated `(chain, key, snapshot_id)` and must never hand out a
/// snapshot id that is not strictly greater than the previous one.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Create tables and indexes if they do not exist yet.
    async fn ensure_schema(&self) -> Result<()>;

    /// Load the snapshot with the highest id for `chain`, if any.
    async fn load_latest(&self, chain: &str) -> Result<Option<Snapshot>>;

    /// Reserve the next snapshot id for `chain`.
    ///
    /// The returned id is strictly greater than every id previously
    /// allocated for the chain and strictly greater than `floor`.
    async fn allocate_snapshot_id(&self, chain: &str, floor: Option<i64>) -> Result<i64>;

    /// Persist a snapshot. Rows that already exist are left untouched.
    async fn append(&self, snapshot: &Snapshot) -> Result<()>;
}
