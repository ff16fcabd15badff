// ABOUTME: Structured whitelist records and ingestion-time validation
// ABOUTME: Normalizes pool keys and rejects malformed entries before diffing

use std::collections::BTreeMap;

use crate::error::{Result, SyncError};

/// Field of an inbound pool object that carries its key.
pub const KEY_FIELD: &str = "address";

/// A single whitelisted item.
///
/// Identity is the normalized `key` alone. `attributes` holds the complete
/// pool object as published on the full channel. Records are only built
/// through validation, see [`ItemRecord::from_value`].
#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub(crate) key: String,
    pub(crate) attributes: serde_json::Value,
}

impl ItemRecord {
    /// Build a record from a raw pool object, normalizing its key.
    ///
    /// The normalized key is written back into the attributes so the full
    /// channel and the minimal channel agree on spelling.
    pub fn from_value(value: serde_json::Value) -> std::result::Result<Self, String> {
        let serde_json::Value::Object(mut object) = value else {
            return Err("entry is not a JSON object".to_string());
        };

        let key = match object.get(KEY_FIELD) {
            Some(serde_json::Value::String(raw)) => normalize_key(raw),
            Some(_) => return Err(format!("'{}' is not a string", KEY_FIELD)),
            None => return Err(format!("missing required field '{}'", KEY_FIELD)),
        };
        if key.is_empty() {
            return Err(format!("'{}' is empty", KEY_FIELD));
        }

        object.insert(
            KEY_FIELD.to_string(),
            serde_json::Value::String(key.clone()),
        );

        Ok(Self {
            key,
            attributes: serde_json::Value::Object(object),
        })
    }
}

impl ItemRecord {
    /// Rebuild a record from a stored `(key, pool object)` row.
    ///
    /// Rows written by older publishers may carry checksummed (mixed-case)
    /// addresses or objects without an address field; both go through the
    /// same normalization as fresh input.
    pub fn from_stored(
        key: &str,
        attributes: serde_json::Value,
    ) -> std::result::Result<Self, String> {
        let serde_json::Value::Object(mut object) = attributes else {
            return Err(format!("stored pool {} is not a JSON object", key));
        };
        object
            .entry(KEY_FIELD)
            .or_insert_with(|| serde_json::Value::String(key.to_string()));
        let record = Self::from_value(serde_json::Value::Object(object))?;
        if record.key != normalize_key(key) {
            return Err(format!(
                "stored key {} disagrees with pool address {}",
                key, record.key
            ));
        }
        Ok(record)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn attributes(&self) -> &serde_json::Value {
        &self.attributes
    }
}

impl PartialEq for ItemRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ItemRecord {}

/// Canonical form of a pool key: trimmed and lower-cased hex.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// The authoritative set of active items for one chain, keyed by item key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    items: BTreeMap<String, ItemRecord>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate raw pool objects and build a whitelist from them.
    ///
    /// Any bad entry rejects the whole batch, including duplicate keys after
    /// normalization.
    pub fn from_values(values: Vec<serde_json::Value>) -> Result<Self> {
        let mut items = BTreeMap::new();
        for (index, value) in values.into_iter().enumerate() {
            let record = ItemRecord::from_value(value)
                .map_err(|reason| SyncError::MalformedInput { index, reason })?;
            if items.contains_key(&record.key) {
                return Err(SyncError::MalformedInput {
                    index,
                    reason: format!("duplicate key {}", record.key),
                });
            }
            items.insert(record.key.clone(), record);
        }
        Ok(Self { items })
    }

    /// Parse a JSON array of pool objects.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let values: Vec<serde_json::Value> =
            serde_json::from_slice(bytes).map_err(|e| SyncError::MalformedInput {
                index: 0,
                reason: format!("expected a JSON array of pool objects: {}", e),
            })?;
        Self::from_values(values)
    }

    /// Insert a record, replacing any record with the same key.
    pub fn insert(&mut self, record: ItemRecord) -> Option<ItemRecord> {
        self.items.insert(record.key.clone(), record)
    }

    pub fn remove(&mut self, key: &str) -> Option<ItemRecord> {
        self.items.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&ItemRecord> {
        self.items.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items.values()
    }
}

impl FromIterator<ItemRecord> for Whitelist {
    fn from_iter<T: IntoIterator<Item = ItemRecord>>(iter: T) -> Self {
        let mut whitelist = Whitelist::new();
        for record in iter {
            whitelist.insert(record);
        }
        whitelist
    }
}
