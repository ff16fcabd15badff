// ABOUTME: Command implementations for the whitelist-sync CLI
// ABOUTME: Exports publish, latest, init-schema, and watch commands

pub mod init_schema;
pub mod latest;
pub mod publish;
pub mod watch;

pub use init_schema::init_schema;
pub use latest::latest;
pub use publish::publish;
pub use watch::watch;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::store::PostgresSnapshotStore;
use crate::utils::sanitize_url;

/// Open the PostgreSQL snapshot store named by the config.
pub(crate) async fn connect_store(config: &SyncConfig) -> Result<Arc<PostgresSnapshotStore>> {
    let url = config.require_database_url()?;
    tracing::info!("Connecting to snapshot store at {}", sanitize_url(url));
    let store = PostgresSnapshotStore::connect(url, config.store_timeout())
        .await
        .context("Failed to connect to snapshot store")?;
    Ok(Arc::new(store))
}
