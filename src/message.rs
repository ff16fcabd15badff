// ABOUTME: Change message model and JSON wire encoding for both channels
// ABOUTME: Builds minimal (keys-only) and full (complete record) payloads and topic names

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::whitelist::{ItemRecord, Whitelist};

pub const DEFAULT_NAMESPACE: &str = "whitelist.pools";

/// Kind of change carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Full,
    Add,
    Remove,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Full => "full",
            MessageKind::Add => "add",
            MessageKind::Remove => "remove",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery destination for one logical update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Keys only, for consumers that just need the active set
    Minimal,
    /// Complete records for Full/Add, key lists for Remove
    Full,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Minimal, Channel::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Minimal => "minimal",
            Channel::Full => "full",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject naming: `<namespace>.<chain>.<channel>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    namespace: String,
}

impl Topics {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn subject(&self, chain: &str, channel: Channel) -> String {
        format!("{}.{}.{}", self.namespace, chain, channel)
    }

    /// Wildcard subject matching both channels of a chain.
    pub fn chain_wildcard(&self, chain: &str) -> String {
        format!("{}.{}.>", self.namespace, chain)
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Fields shared by every message of one logical update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub chain: String,
    pub snapshot_id: i64,
    pub timestamp: DateTime<Utc>,
}

/// An immutable change message, rendered per channel by [`ChangeMessage::encode`].
#[derive(Debug, Clone)]
pub enum ChangeMessage {
    Full {
        header: MessageHeader,
        records: Vec<ItemRecord>,
    },
    Add {
        header: MessageHeader,
        records: Vec<ItemRecord>,
    },
    Remove {
        header: MessageHeader,
        keys: Vec<String>,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum PoolList<'a> {
    Keys(Vec<&'a str>),
    Records(Vec<&'a serde_json::Value>),
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pools: Option<PoolList<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool_addresses: Option<PoolList<'a>>,
    chain: &'a str,
    timestamp: DateTime<Utc>,
    snapshot_id: i64,
}

fn keys_of(records: &[ItemRecord]) -> PoolList<'_> {
    PoolList::Keys(records.iter().map(|r| r.key.as_str()).collect())
}

impl ChangeMessage {
    pub fn full(header: MessageHeader, whitelist: &Whitelist) -> Self {
        ChangeMessage::Full {
            header,
            records: whitelist.records().cloned().collect(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ChangeMessage::Full { .. } => MessageKind::Full,
            ChangeMessage::Add { .. } => MessageKind::Add,
            ChangeMessage::Remove { .. } => MessageKind::Remove,
        }
    }

    pub fn header(&self) -> &MessageHeader {
        match self {
            ChangeMessage::Full { header, .. }
            | ChangeMessage::Add { header, .. }
            | ChangeMessage::Remove { header, .. } => header,
        }
    }

    /// Number of pools the message refers to.
    pub fn len(&self) -> usize {
        match self {
            ChangeMessage::Full { records, .. } | ChangeMessage::Add { records, .. } => {
                records.len()
            }
            ChangeMessage::Remove { keys, .. } => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the payload for one channel.
    pub fn encode(&self, channel: Channel) -> Result<Vec<u8>, serde_json::Error> {
        let header = self.header();

        let (pools, pool_addresses) = match (self, channel) {
            (ChangeMessage::Full { records, .. }, Channel::Minimal)
            | (ChangeMessage::Add { records, .. }, Channel::Minimal) => {
                (Some(keys_of(records)), None)
            }
            (ChangeMessage::Full { records, .. }, Channel::Full)
            | (ChangeMessage::Add { records, .. }, Channel::Full) => (
                Some(PoolList::Records(
                    records.iter().map(|r| &r.attributes).collect(),
                )),
                None,
            ),
            (ChangeMessage::Remove { keys, .. }, Channel::Minimal) => (
                Some(PoolList::Keys(keys.iter().map(String::as_str).collect())),
                None,
            ),
            (ChangeMessage::Remove { keys, .. }, Channel::Full) => (
                None,
                Some(PoolList::Keys(keys.iter().map(String::as_str).collect())),
            ),
        };

        serde_json::to_vec(&OutboundMessage {
            kind: self.kind(),
            pools,
            pool_addresses,
            chain: &header.chain,
            timestamp: header.timestamp,
            snapshot_id: header.snapshot_id,
        })
    }
}

/// Pools carried by a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPools {
    Keys(Vec<String>),
    Records(Vec<ItemRecord>),
}

impl InboundPools {
    pub fn len(&self) -> usize {
        match self {
            InboundPools::Keys(keys) => keys.len(),
            InboundPools::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        match self {
            InboundPools::Keys(keys) => keys.clone(),
            InboundPools::Records(records) => records.iter().map(|r| r.key.clone()).collect(),
        }
    }
}

/// A change message as seen by a subscriber on either channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub chain: String,
    pub snapshot_id: i64,
    pub timestamp: DateTime<Utc>,
    pub pools: InboundPools,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    pools: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pool_addresses: Option<Vec<serde_json::Value>>,
    chain: String,
    timestamp: DateTime<Utc>,
    snapshot_id: i64,
}

impl InboundMessage {
    /// Decode a payload from either channel.
    ///
    /// Pool lists may hold bare keys or complete pool objects; keys are
    /// normalized the same way as at ingestion.
    pub fn decode(payload: &[u8]) -> anyhow::Result<Self> {
        let wire: WireMessage = serde_json::from_slice(payload)?;
        let entries = wire
            .pools
            .or(wire.pool_addresses)
            .ok_or_else(|| anyhow::anyhow!("message has neither 'pools' nor 'pool_addresses'"))?;

        let pools = if entries.iter().all(|v| v.is_string()) {
            InboundPools::Keys(
                entries
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(crate::whitelist::normalize_key)
                    .collect(),
            )
        } else {
            let records = entries
                .into_iter()
                .enumerate()
                .map(|(index, value)| {
                    ItemRecord::from_value(value)
                        .map_err(|reason| anyhow::anyhow!("pool {}: {}", index, reason))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            InboundPools::Records(records)
        };

        Ok(Self {
            kind: wire.kind,
            chain: wire.chain,
            snapshot_id: wire.snapshot_id,
            timestamp: wire.timestamp,
            pools,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn header() -> MessageHeader {
        MessageHeader {
            chain: "ethereum".to_string(),
            snapshot_id: 42,
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    fn record(key: &str) -> ItemRecord {
        ItemRecord::from_value(json!({"address": key, "protocol": "UniswapV3", "fee": 500}))
            .unwrap()
    }

    fn encoded(message: &ChangeMessage, channel: Channel) -> Value {
        serde_json::from_slice(&message.encode(channel).unwrap()).unwrap()
    }

    #[test]
    fn test_topics() {
        let topics = Topics::default();
        assert_eq!(
            topics.subject("ethereum", Channel::Minimal),
            "whitelist.pools.ethereum.minimal"
        );
        assert_eq!(topics.subject("base", Channel::Full), "whitelist.pools.base.full");
        assert_eq!(topics.chain_wildcard("base"), "whitelist.pools.base.>");
    }

    #[test]
    fn test_add_minimal_carries_keys_only() {
        let message = ChangeMessage::Add {
            header: header(),
            records: vec![record("0x01"), record("0x02")],
        };
        let value = encoded(&message, Channel::Minimal);
        assert_eq!(value["type"], "add");
        assert_eq!(value["pools"], json!(["0x01", "0x02"]));
        assert_eq!(value["chain"], "ethereum");
        assert_eq!(value["snapshot_id"], 42);
        assert!(value.get("pool_addresses").is_none());
    }

    #[test]
    fn test_full_channel_carries_records() {
        let message = ChangeMessage::Full {
            header: header(),
            records: vec![record("0x01")],
        };
        let value = encoded(&message, Channel::Full);
        assert_eq!(value["type"], "full");
        assert_eq!(value["pools"][0]["address"], "0x01");
        assert_eq!(value["pools"][0]["fee"], 500);
    }

    #[test]
    fn test_remove_uses_pool_addresses_on_full_channel() {
        let message = ChangeMessage::Remove {
            header: header(),
            keys: vec!["0x03".to_string()],
        };
        let minimal = encoded(&message, Channel::Minimal);
        let full = encoded(&message, Channel::Full);

        assert_eq!(minimal["pools"], json!(["0x03"]));
        assert!(minimal.get("pool_addresses").is_none());
        assert_eq!(full["pool_addresses"], json!(["0x03"]));
        assert!(full.get("pools").is_none());
        assert_eq!(minimal["timestamp"], full["timestamp"]);
    }

    #[test]
    fn test_decode_both_channel_shapes() {
        let message = ChangeMessage::Add {
            header: header(),
            records: vec![record("0x01")],
        };

        let minimal = InboundMessage::decode(&message.encode(Channel::Minimal).unwrap()).unwrap();
        assert_eq!(minimal.pools, InboundPools::Keys(vec!["0x01".to_string()]));
        assert_eq!(minimal.snapshot_id, 42);

        let full = InboundMessage::decode(&message.encode(Channel::Full).unwrap()).unwrap();
        match full.pools {
            InboundPools::Records(records) => assert_eq!(records[0].attributes["fee"], 500),
            other => panic!("expected records, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_accepts_offset_timestamps() {
        let payload = br#"{"type":"remove","pool_addresses":["0xAB"],"chain":"base",
            "timestamp":"2024-05-01T12:00:00.123456+00:00","snapshot_id":7}"#;
        let message = InboundMessage::decode(payload).unwrap();
        assert_eq!(message.kind, MessageKind::Remove);
        assert_eq!(message.pools.keys(), vec!["0xab".to_string()]);
    }

    #[test]
    fn test_decode_rejects_missing_pools() {
        let payload = br#"{"type":"add","chain":"base","timestamp":"2024-05-01T12:00:00Z","snapshot_id":7}"#;
        assert!(InboundMessage::decode(payload).is_err());
    }
}
