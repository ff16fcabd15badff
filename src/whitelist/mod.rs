// ABOUTME: Whitelist data model and diffing
// ABOUTME: Records, per-chain whitelists, and the key-presence diff engine

pub mod diff;
pub mod record;

pub use diff::{diff, WhitelistDiff};
pub use record::{normalize_key, ItemRecord, Whitelist, KEY_FIELD};
