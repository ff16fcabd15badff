// ABOUTME: init-schema command - creates snapshot tables and indexes
// ABOUTME: Safe to run repeatedly against an existing database

use anyhow::Result;

use crate::config::SyncConfig;
use crate::store::SnapshotStore;

pub async fn init_schema(config: &SyncConfig) -> Result<()> {
    let store = super::connect_store(config).await?;
    store.ensure_schema().await?;
    println!("Snapshot schema is ready.");
    Ok(())
}
