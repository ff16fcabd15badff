// ABOUTME: watch command - follows a chain's whitelist updates over NATS
// ABOUTME: Logs each applied update until Ctrl+C or the subscription closes

use anyhow::Result;

use crate::config::SyncConfig;
use crate::message::Channel;
use crate::subscriber::WhitelistSubscriber;
use crate::transport::NatsTransport;
use crate::utils::validate_chain_name;

pub async fn watch(config: &SyncConfig, chain: &str, channel: Option<Channel>) -> Result<()> {
    validate_chain_name(chain)?;

    let transport = NatsTransport::connect(&config.nats_url).await?;
    let subscriber = WhitelistSubscriber::new(transport, config.topics());

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            // keep the sender alive so the watch only ends with its subscription
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    println!("Watching whitelist updates for {} (Ctrl+C to stop)", chain);
    let state = subscriber.watch(chain, channel, shutdown_rx).await?;

    for channel in Channel::ALL {
        if let Some(tracker) = state.tracker(channel) {
            let stats = tracker.stats();
            println!(
                "[{}] {} pools tracked, last snapshot {}",
                channel,
                stats.tracked,
                stats
                    .last_snapshot_id
                    .map_or_else(|| "none".to_string(), |id| id.to_string())
            );
        }
    }
    Ok(())
}
