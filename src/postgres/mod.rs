// ABOUTME: PostgreSQL utilities
// ABOUTME: Connection management for the relational snapshot store

pub mod connection;

pub use connection::{connect, connect_with_retry, init_tls_policy};
