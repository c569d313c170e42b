use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::types::{AlertRecord, ExitSummary};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("alert log i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("alert serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable, append-only destination for raised alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Persist `record`. Returns only once the record is durable.
    async fn append(&self, record: &AlertRecord) -> Result<(), SinkError>;
}

/// Appends one JSON object per line to a file. Existing lines are never touched.
pub struct JsonlAlertSink {
    path: PathBuf,
}

impl JsonlAlertSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AlertSink for JsonlAlertSink {
    async fn append(&self, record: &AlertRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Emit a raised alert as a single JSON line to stdout.
pub fn report_alert(record: &AlertRecord) {
    if let Ok(json) = serde_json::to_string(record) {
        println!("{json}");
    }
}

/// Emit the exit summary as pretty-printed JSON to stdout.
pub fn report_exit_summary(summary: &ExitSummary) {
    if let Ok(json) = serde_json::to_string_pretty(summary) {
        println!("{json}");
    }
}
