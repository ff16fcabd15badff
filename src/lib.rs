// ABOUTME: Library root for whitelist-sync
// ABOUTME: Differential whitelist publishing with persisted snapshots and subscriber tracking

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod postgres;
pub mod publisher;
pub mod store;
pub mod subscriber;
pub mod transport;
pub mod utils;
pub mod whitelist;

pub use config::SyncConfig;
pub use coordinator::{SyncCoordinator, SyncMode, UpdateResult};
pub use error::{Result, SyncError};
pub use message::{Channel, MessageKind, Topics};
pub use publisher::UpdatePublisher;
pub use store::{Snapshot, SnapshotStore};
pub use subscriber::{ApplyOutcome, WhitelistTracker};
pub use whitelist::{diff, ItemRecord, Whitelist, WhitelistDiff};
