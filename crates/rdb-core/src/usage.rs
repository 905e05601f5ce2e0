//! Usage log: one JSON line per successful save.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::{domain::UserId, ports::UsageTracker, utils::iso_timestamp_utc, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub timestamp: String,
    pub event: String,
    pub user_id: i64,
    /// What was saved: `link`, `attachment` or `document`.
    pub kind: String,
}

impl UsageEvent {
    pub fn save(user_id: UserId, kind: &str) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: "save".to_string(),
            user_id: user_id.0,
            kind: kind.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UsageLog {
    path: PathBuf,
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, event: &UsageEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl UsageTracker for UsageLog {
    async fn record_usage(&self, user_id: UserId, kind: &str) -> Result<()> {
        self.write(&UsageEvent::save(user_id, kind)).await
    }
}
