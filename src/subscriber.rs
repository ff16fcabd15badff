// ABOUTME: Subscriber side of whitelist sync - decodes change messages and tracks state
// ABOUTME: Applies Full/Add/Remove in snapshot order and drops stale or foreign updates

use anyhow::{Context, Result};
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio::sync::broadcast;

use crate::message::{Channel, InboundMessage, InboundPools, MessageKind, Topics};
use crate::transport::NatsTransport;
use crate::whitelist::ItemRecord;

/// What a tracker did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Older than, or a repeat of, something already applied
    Stale { last_snapshot_id: i64 },
    /// Addressed to another chain
    WrongChain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStats {
    pub chain: String,
    pub tracked: usize,
    pub with_records: usize,
    pub last_snapshot_id: Option<i64>,
}

/// Local view of one chain's whitelist, as seen on a single channel.
///
/// Use one tracker per channel: both channels carry the same update with
/// the same snapshot id, so a tracker fed by both would drop the second copy.
#[derive(Debug, Clone)]
pub struct WhitelistTracker {
    chain: String,
    keys: BTreeSet<String>,
    /// Complete pool objects, only known from the full channel
    records: BTreeMap<String, ItemRecord>,
    last_snapshot_id: Option<i64>,
    /// Kinds already applied at `last_snapshot_id`
    applied_kinds: HashSet<MessageKind>,
}

impl WhitelistTracker {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            keys: BTreeSet::new(),
            records: BTreeMap::new(),
            last_snapshot_id: None,
            applied_kinds: HashSet::new(),
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn apply(&mut self, message: &InboundMessage) -> ApplyOutcome {
        if message.chain != self.chain {
            return ApplyOutcome::WrongChain;
        }

        if let Some(last) = self.last_snapshot_id {
            let repeated = message.snapshot_id == last && self.applied_kinds.contains(&message.kind);
            if message.snapshot_id < last || repeated {
                tracing::debug!(
                    "Dropping stale {} update {} for {} (last applied {})",
                    message.kind,
                    message.snapshot_id,
                    self.chain,
                    last
                );
                return ApplyOutcome::Stale {
                    last_snapshot_id: last,
                };
            }
        }

        if self.last_snapshot_id != Some(message.snapshot_id) {
            self.applied_kinds.clear();
            self.last_snapshot_id = Some(message.snapshot_id);
        }
        self.applied_kinds.insert(message.kind);

        match message.kind {
            MessageKind::Full => {
                self.keys.clear();
                self.records.clear();
                self.insert(&message.pools);
            }
            MessageKind::Add => self.insert(&message.pools),
            MessageKind::Remove => {
                for key in message.pools.keys() {
                    self.records.remove(&key);
                    self.keys.remove(&key);
                }
            }
        }

        ApplyOutcome::Applied
    }

    fn insert(&mut self, pools: &InboundPools) {
        match pools {
            InboundPools::Keys(keys) => self.keys.extend(keys.iter().cloned()),
            InboundPools::Records(records) => {
                for record in records {
                    self.keys.insert(record.key.clone());
                    self.records.insert(record.key.clone(), record.clone());
                }
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&ItemRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn last_snapshot_id(&self) -> Option<i64> {
        self.last_snapshot_id
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            chain: self.chain.clone(),
            tracked: self.keys.len(),
            with_records: self.records.len(),
            last_snapshot_id: self.last_snapshot_id,
        }
    }
}

/// Routes raw payloads to one tracker per channel.
pub struct WatchState {
    topics: Topics,
    trackers: HashMap<Channel, WhitelistTracker>,
}

impl WatchState {
    pub fn new(topics: Topics, chain: &str, channels: &[Channel]) -> Self {
        let trackers = channels
            .iter()
            .map(|channel| (*channel, WhitelistTracker::new(chain)))
            .collect();
        Self { topics, trackers }
    }

    pub fn tracker(&self, channel: Channel) -> Option<&WhitelistTracker> {
        self.trackers.get(&channel)
    }

    /// Decode and apply one payload received on `subject`.
    pub fn handle(&mut self, subject: &str, payload: &[u8]) -> Result<(Channel, ApplyOutcome)> {
        let channel = channel_of(&self.topics, subject)
            .with_context(|| format!("Unexpected subject {}", subject))?;
        let tracker = self
            .trackers
            .get_mut(&channel)
            .with_context(|| format!("Not watching the {} channel", channel))?;
        let message = InboundMessage::decode(payload)
            .with_context(|| format!("Failed to decode message on {}", subject))?;
        Ok((channel, tracker.apply(&message)))
    }
}

/// Which channel a subject under `topics` belongs to.
pub fn channel_of(topics: &Topics, subject: &str) -> Option<Channel> {
    let rest = subject.strip_prefix(topics.namespace())?.strip_prefix('.')?;
    let (_chain, channel) = rest.rsplit_once('.')?;
    Channel::ALL.into_iter().find(|c| c.as_str() == channel)
}

/// Subscribes to a chain's change messages over NATS.
pub struct WhitelistSubscriber {
    transport: NatsTransport,
    topics: Topics,
}

impl WhitelistSubscriber {
    pub fn new(transport: NatsTransport, topics: Topics) -> Self {
        Self { transport, topics }
    }

    /// Subscribe to one channel, or to both when `channel` is `None`.
    pub async fn subscribe(
        &self,
        chain: &str,
        channel: Option<Channel>,
    ) -> Result<async_nats::Subscriber> {
        let subject = match channel {
            Some(channel) => self.topics.subject(chain, channel),
            None => self.topics.chain_wildcard(chain),
        };
        self.transport.subscribe(subject).await
    }

    /// Apply updates until shutdown or until the subscription closes.
    ///
    /// Returns the final per-channel state.
    pub async fn watch(
        &self,
        chain: &str,
        channel: Option<Channel>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<WatchState> {
        let channels: Vec<Channel> = match channel {
            Some(channel) => vec![channel],
            None => Channel::ALL.to_vec(),
        };
        let mut state = WatchState::new(self.topics.clone(), chain, &channels);
        let mut subscription = self.subscribe(chain, channel).await?;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Stopping whitelist watch for {}", chain);
                    break;
                }
                message = subscription.next() => {
                    let Some(message) = message else {
                        tracing::warn!("Whitelist subscription for {} closed", chain);
                        break;
                    };
                    match state.handle(&message.subject, &message.payload) {
                        Ok((channel, ApplyOutcome::Applied)) => {
                            if let Some(tracker) = state.tracker(channel) {
                                tracing::info!(
                                    "[{}] {} now tracks {} pools (snapshot {:?})",
                                    channel,
                                    chain,
                                    tracker.len(),
                                    tracker.last_snapshot_id()
                                );
                            }
                        }
                        Ok((channel, outcome)) => {
                            tracing::debug!("[{}] ignored update: {:?}", channel, outcome);
                        }
                        Err(e) => tracing::warn!("{:#}", e),
                    }
                }
            }
        }

        Ok(state)
    }
}
