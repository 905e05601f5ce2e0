//! JSON-file user store.
//!
//! The file is maintained outside the bot and re-read on every lookup, so
//! newly registered users are picked up without a restart.
//!
//! Format: `{"users": [{"telegram_id": 1, "username": "alice", "raindrop_token": "..."}]}`

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    domain::UserId,
    ports::{UserRecord, UserStore},
    Result,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UsersFile {
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

impl UsersFile {
    pub fn find(&self, user_id: UserId) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.telegram_id == user_id.0)
    }
}

#[derive(Clone, Debug)]
pub struct JsonUserStore {
    path: PathBuf,
}

impl JsonUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty store.
    pub async fn load(&self) -> Result<UsersFile> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "user store not found, no users registered");
                return Ok(UsersFile::default());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(UsersFile::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn find(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.load().await?.find(user_id).cloned())
    }
}
