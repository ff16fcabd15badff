// ABOUTME: publish command - runs one sync cycle from a whitelist JSON file
// ABOUTME: Connects the snapshot store and NATS, then drives SyncCoordinator

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::coordinator::{SyncCoordinator, SyncMode, UpdateResult};
use crate::publisher::UpdatePublisher;
use crate::store::SnapshotStore;
use crate::transport::NatsTransport;
use crate::utils::validate_chain_name;
use crate::whitelist::Whitelist;

pub async fn publish(
    config: &SyncConfig,
    chain: &str,
    file: &Path,
    force_full: bool,
) -> Result<UpdateResult> {
    validate_chain_name(chain)?;

    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read whitelist file {}", file.display()))?;
    let whitelist = Whitelist::from_json_slice(&bytes)
        .with_context(|| format!("Invalid whitelist file {}", file.display()))?;
    tracing::info!(
        "Loaded {} pools for {} from {}",
        whitelist.len(),
        chain,
        file.display()
    );

    let store = super::connect_store(config).await?;
    store.ensure_schema().await?;

    let transport = NatsTransport::connect(&config.nats_url).await?;
    let publisher = UpdatePublisher::new(Arc::new(transport), config.topics())
        .with_timeout(config.publish_timeout());
    let coordinator = SyncCoordinator::new(store, publisher);

    let result = match coordinator.sync(chain, whitelist, force_full).await {
        Ok(result) => result,
        Err(e) => {
            if e.requires_full_resync() {
                tracing::error!(
                    "Subscribers of {} may be out of step; rerun with --force-full",
                    chain
                );
            }
            return Err(e).context(format!("Sync cycle for {} failed", chain));
        }
    };

    println!("Published snapshot {} for {}", result.snapshot_id, chain);
    match result.mode {
        SyncMode::Full => println!("  Full update: {} pools", result.total),
        SyncMode::Differential => println!(
            "  Differential update: +{} -{} ({} pools total)",
            result.added, result.removed, result.total
        ),
    }

    Ok(result)
}
