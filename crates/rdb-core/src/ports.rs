//! Hexagonal ports for the collaborators the dispatcher talks to.
//!
//! Concrete implementations live in the adapter crates (`rdb-raindrop`,
//! `rdb-publish`, `rdb-telegram`). The messaging port lives in
//! [`crate::messaging`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{BookmarkAccount, BookmarkRef, UserId},
    Result,
};

/// Bookmark to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBookmark {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Ask the service to fetch title/excerpt/cover from the page itself.
    pub parse_metadata: bool,
}

impl NewBookmark {
    /// A link whose metadata the service parses on its own.
    pub fn parsed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            description: None,
            parse_metadata: true,
        }
    }

    pub fn titled(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: Some(title.into()),
            description: None,
            parse_metadata: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// File payload uploaded to a bookmark or image host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    pub bytes: Vec<u8>,
    pub name: String,
    pub mime: String,
}

/// Result order understood by the bookmark service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAsc,
    CreatedDesc,
    Score,
    /// The user's own manual ordering.
    #[default]
    Manual,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::CreatedAsc => "created",
            SortOrder::CreatedDesc => "-created",
            SortOrder::Score => "score",
            SortOrder::Manual => "-sort",
        }
    }
}

/// Lookup across all of a user's collections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookmarkQuery {
    pub search: Option<String>,
    pub sort: SortOrder,
    pub page: u32,
    pub per_page: u32,
}

/// A stored bookmark, as returned by a lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bookmark {
    pub id: BookmarkRef,
    pub link: String,
    pub title: String,
    pub excerpt: String,
    pub cover: Option<String>,
}

#[async_trait]
pub trait BookmarkService: Send + Sync {
    async fn create_bookmark(
        &self,
        account: &BookmarkAccount,
        bookmark: NewBookmark,
    ) -> Result<BookmarkRef>;

    /// Attach a file to an existing bookmark.
    async fn upload_file(
        &self,
        account: &BookmarkAccount,
        bookmark: BookmarkRef,
        file: FileUpload,
    ) -> Result<()>;

    async fn search(&self, account: &BookmarkAccount, query: BookmarkQuery)
        -> Result<Vec<Bookmark>>;
}

/// Publishes a standalone HTML page and returns its public URL.
#[async_trait]
pub trait PasteService: Send + Sync {
    async fn upload_html(&self, html: &str) -> Result<String>;
}

/// Hosts images and returns their public URLs.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload_image(&self, image: FileUpload) -> Result<Vec<String>>;
}

/// Records successful saves. Failures are never surfaced to the user.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn record_usage(&self, user_id: UserId, kind: &str) -> Result<()>;
}

/// A registered bot user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub telegram_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    /// Raindrop.io API token; absent until the user has connected an account.
    #[serde(default)]
    pub raindrop_token: Option<String>,
}

impl UserRecord {
    pub fn bookmark_account(&self) -> Option<BookmarkAccount> {
        self.raindrop_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| BookmarkAccount {
                api_token: t.to_string(),
            })
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, user_id: UserId) -> Result<Option<UserRecord>>;
}
