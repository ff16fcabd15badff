// ABOUTME: In-memory transport that records every published payload
// ABOUTME: Supports per-subject failure injection and artificial stalls

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;

use super::Transport;

#[derive(Default)]
struct Recorder {
    published: Vec<(String, Vec<u8>)>,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    fail_after: Option<usize>,
}

/// Records publishes instead of sending them anywhere.
#[derive(Default)]
pub struct RecordingTransport {
    inner: Mutex<Recorder>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `subject` fail until cleared.
    pub async fn fail_subject(&self, subject: impl Into<String>) {
        self.inner.lock().await.failing.insert(subject.into());
    }

    /// Make every publish to `subject` hang, so callers hit their timeout.
    pub async fn stall_subject(&self, subject: impl Into<String>) {
        self.inner.lock().await.stalled.insert(subject.into());
    }

    /// Fail every publish once `count` payloads have been recorded.
    pub async fn fail_after(&self, count: usize) {
        self.inner.lock().await.fail_after = Some(count);
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing.clear();
        inner.stalled.clear();
        inner.fail_after = None;
    }

    /// Everything published so far, in order.
    pub async fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.lock().await.published.clone()
    }

    /// Payloads published to one subject, decoded as JSON.
    pub async fn published_json(&self, subject: &str) -> Vec<serde_json::Value> {
        self.inner
            .lock()
            .await
            .published
            .iter()
            .filter(|(s, _)| s == subject)
            .filter_map(|(_, payload)| serde_json::from_slice(payload).ok())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            let exhausted = inner
                .fail_after
                .is_some_and(|count| inner.published.len() >= count);
            if exhausted || inner.failing.contains(subject) {
                bail!("broker rejected publish to {}", subject);
            }
            if !inner.stalled.contains(subject) {
                inner.published.push((subject.to_string(), payload));
                return Ok(());
            }
        }

        tokio::time::sleep(Duration::from_secs(3600)).await;
        bail!("publish to {} never completed", subject)
    }
}
