//! Dead-letter sink
//!
//! Submissions are at-most-once: a failed submit is never retried by the
//! poller, because the API may already have sent the e-mail before failing.
//! Failed items are handed to a sink so an operator can replay them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duewatch_core::domain::{DueItem, DueKind};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Destination for items whose submission failed
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Records a failed item
    ///
    /// # Arguments
    /// * `kind` - Resource the item belongs to
    /// * `item` - The item as it was submitted
    /// * `error` - Why the submission failed
    async fn record(&self, kind: DueKind, item: &DueItem, error: &str) -> Result<()>;
}

/// Sink that keeps nothing; the dispatcher's error log is the only trace
pub struct DiscardDeadLetters;

#[async_trait]
impl DeadLetterSink for DiscardDeadLetters {
    async fn record(&self, _kind: DueKind, _item: &DueItem, _error: &str) -> Result<()> {
        Ok(())
    }
}

/// One line of the dead-letter file
#[derive(Debug, Serialize)]
struct DeadLetterEntry<'a> {
    failed_at: DateTime<Utc>,
    kind: DueKind,
    error: &'a str,
    item: &'a DueItem,
}

/// Appends failed items to a JSON-lines file
pub struct JsonlDeadLetterFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlDeadLetterFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl DeadLetterSink for JsonlDeadLetterFile {
    async fn record(&self, kind: DueKind, item: &DueItem, error: &str) -> Result<()> {
        let entry = DeadLetterEntry {
            failed_at: Utc::now(),
            kind,
            error,
            item,
        };
        let mut line = serde_json::to_vec(&entry).context("Failed to encode dead letter")?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        file.write_all(&line)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        file.flush().await?;

        Ok(())
    }
}
