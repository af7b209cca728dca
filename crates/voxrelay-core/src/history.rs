//! Append-only log of completed question/answer exchanges

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%y-%m-%d %-H:%-M:%-S";

/// One completed exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub question: String,
    pub answer: String,
    pub timestamp: String,
}

impl InteractionRecord {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::at(question, answer, Local::now())
    }

    pub fn at(
        question: impl Into<String>,
        answer: impl Into<String>,
        when: DateTime<Local>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp: when.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// File-backed interaction log. Each record is a pretty-printed JSON object
/// followed by a newline.
#[derive(Debug, Clone)]
pub struct InteractionLog {
    path: PathBuf,
}

impl InteractionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &InteractionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut entry = serde_json::to_string_pretty(record)?;
        entry.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended interaction to {:?}", self.path);
        Ok(())
    }
}
