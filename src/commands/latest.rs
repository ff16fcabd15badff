// ABOUTME: latest command - prints the most recent stored snapshot for a chain
// ABOUTME: Read-only view of what subscribers should currently hold

use anyhow::Result;

use crate::config::SyncConfig;
use crate::store::{Snapshot, SnapshotStore};
use crate::utils::validate_chain_name;

/// Pool keys listed before the summary is truncated
const PREVIEW_KEYS: usize = 10;

pub async fn latest(config: &SyncConfig, chain: &str) -> Result<Option<Snapshot>> {
    validate_chain_name(chain)?;
    let store = super::connect_store(config).await?;

    let Some(snapshot) = store.load_latest(chain).await? else {
        println!("No snapshot has been published for {} yet.", chain);
        return Ok(None);
    };

    println!("Chain:        {}", snapshot.chain);
    println!("Snapshot id:  {}", snapshot.snapshot_id);
    println!("Published at: {}", snapshot.published_at.to_rfc3339());
    println!("Pools:        {}", snapshot.items.len());
    for key in snapshot.items.keys().take(PREVIEW_KEYS) {
        println!("  {}", key);
    }
    if snapshot.items.len() > PREVIEW_KEYS {
        println!("  ... and {} more", snapshot.items.len() - PREVIEW_KEYS);
    }

    Ok(Some(snapshot))
}
