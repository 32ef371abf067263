//! Storage handoff for crawled content and detected changes.

use crate::changes::ChangeEvent;
use crate::error::Result;
use crate::results::ContentRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Receives one record per fetched page and one per change event.
///
/// Errors are logged by the caller and never stop a crawl.
#[async_trait]
pub trait ContentSink: Send + Sync {
    async fn store_page(&self, record: &ContentRecord) -> Result<()>;

    async fn store_change(&self, change: &ChangeEvent) -> Result<()>;
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl ContentSink for NullSink {
    async fn store_page(&self, _record: &ContentRecord) -> Result<()> {
        Ok(())
    }

    async fn store_change(&self, _change: &ChangeEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pages: std::sync::Mutex<Vec<ContentRecord>>,
    changes: std::sync::Mutex<Vec<ChangeEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> Vec<ContentRecord> {
        self.pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn changes(&self) -> Vec<ChangeEvent> {
        self.changes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ContentSink for MemorySink {
    async fn store_page(&self, record: &ContentRecord) -> Result<()> {
        self.pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn store_change(&self, change: &ChangeEvent) -> Result<()> {
        self.changes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(change.clone());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JsonLine<'a> {
    Page(&'a ContentRecord),
    Change(&'a ChangeEvent),
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if missing
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        ::log::info!("Writing crawl records to {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_line(&self, line: JsonLine<'_>) -> Result<()> {
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ContentSink for JsonLinesSink {
    async fn store_page(&self, record: &ContentRecord) -> Result<()> {
        self.write_line(JsonLine::Page(record)).await
    }

    async fn store_change(&self, change: &ChangeEvent) -> Result<()> {
        self.write_line(JsonLine::Change(change)).await
    }
}
