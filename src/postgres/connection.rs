// ABOUTME: PostgreSQL connection setup for the snapshot store
// ABOUTME: Handles TLS policy, statement timeouts, and connect retries

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_postgres::Client;

use crate::utils::{retry_with_backoff, sanitize_url, validate_connection_string};

static ALLOW_SELF_SIGNED: OnceLock<bool> = OnceLock::new();

/// Set whether self-signed server certificates are accepted.
///
/// Only the first call has an effect; later calls are ignored.
pub fn init_tls_policy(allow_self_signed: bool) {
    let _ = ALLOW_SELF_SIGNED.set(allow_self_signed);
}

fn allow_self_signed() -> bool {
    ALLOW_SELF_SIGNED.get().copied().unwrap_or(false)
}

fn tls_connector() -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();
    if allow_self_signed() {
        tracing::warn!("Accepting invalid TLS certificates for PostgreSQL connections");
        builder.danger_accept_invalid_certs(true);
    }
    let connector = builder.build().context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Connect to PostgreSQL and spawn the connection driver task.
///
/// When `statement_timeout` is set, the server aborts any statement on this
/// session that runs longer than that.
pub async fn connect(url: &str, statement_timeout: Option<Duration>) -> Result<Client> {
    validate_connection_string(url)?;

    let (client, connection) = tokio_postgres::connect(url, tls_connector()?)
        .await
        .with_context(|| format!("Failed to connect to {}", sanitize_url(url)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    if let Some(timeout) = statement_timeout {
        client
            .batch_execute(&format!(
                "SET statement_timeout = {}",
                timeout.as_millis()
            ))
            .await
            .context("Failed to set statement_timeout")?;
    }

    tracing::debug!("Connected to {}", sanitize_url(url));
    Ok(client)
}

/// Connect with exponential backoff (3 retries starting at 1s).
pub async fn connect_with_retry(url: &str, statement_timeout: Option<Duration>) -> Result<Client> {
    retry_with_backoff(
        || connect(url, statement_timeout),
        3,
        Duration::from_secs(1),
    )
    .await
}
