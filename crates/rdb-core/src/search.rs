//! Inline search over a user's saved bookmarks.
//!
//! A query with text runs a full-text search in the service's own order; an
//! empty query lists bookmarks oldest first. Each bookmark becomes a
//! [`SearchHit`] the transport can offer as an inline result.

use std::{sync::Arc, time::Duration};

use crate::{
    compose::escape_html,
    domain::UserId,
    errors::Error,
    ports::{Bookmark, BookmarkQuery, BookmarkService, SortOrder, UserStore},
    security::{authorize, AccessDecision, Denial, HandlerPolicy},
    Result,
};

/// Telegram shows at most 50 inline results per answer.
pub const SEARCH_PAGE_SIZE: u32 = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub thumb_url: Option<String>,
    /// Message posted to the chat when the hit is picked.
    pub message_html: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    Hits(Vec<SearchHit>),
    Denied(Denial),
}

pub fn query_for(text: &str) -> BookmarkQuery {
    let text = text.trim();
    if text.is_empty() {
        return BookmarkQuery {
            search: None,
            sort: SortOrder::CreatedAsc,
            page: 0,
            per_page: SEARCH_PAGE_SIZE,
        };
    }
    BookmarkQuery {
        search: Some(text.to_string()),
        sort: SortOrder::default(),
        page: 0,
        per_page: SEARCH_PAGE_SIZE,
    }
}

pub fn search_hit(bookmark: Bookmark) -> SearchHit {
    let title = if bookmark.title.trim().is_empty() {
        bookmark.link.clone()
    } else {
        bookmark.title.trim().to_string()
    };
    let description = Some(bookmark.excerpt.trim())
        .filter(|e| !e.is_empty())
        .map(str::to_string);

    let mut message_html = format!(
        r#"<b><a href="{}">{}</a></b>"#,
        escape_html(&bookmark.link),
        escape_html(&title)
    );
    if let Some(excerpt) = &description {
        message_html.push_str("\n\n");
        message_html.push_str(&escape_html(excerpt));
    }

    SearchHit {
        id: bookmark.id.0.to_string(),
        title,
        description,
        url: bookmark.link,
        thumb_url: bookmark.cover.filter(|c| !c.trim().is_empty()),
        message_html,
    }
}

pub struct BookmarkSearch {
    bookmarks: Arc<dyn BookmarkService>,
    users: Arc<dyn UserStore>,
    admin_id: Option<i64>,
    timeout: Duration,
}

impl BookmarkSearch {
    pub fn new(
        bookmarks: Arc<dyn BookmarkService>,
        users: Arc<dyn UserStore>,
        admin_id: Option<i64>,
        timeout: Duration,
    ) -> Self {
        Self {
            bookmarks,
            users,
            admin_id,
            timeout,
        }
    }

    pub async fn search(&self, user_id: UserId, text: &str) -> Result<SearchOutcome> {
        let decision = authorize(
            HandlerPolicy::INLINE,
            user_id,
            self.admin_id,
            self.users.as_ref(),
        )
        .await?;
        let account = match decision {
            AccessDecision::Allowed {
                account: Some(account),
            } => account,
            AccessDecision::Allowed { account: None } => {
                return Ok(SearchOutcome::Denied(Denial::NoBookmarkAccount))
            }
            AccessDecision::Denied(denial) => return Ok(SearchOutcome::Denied(denial)),
        };

        let query = query_for(text);
        let bookmarks = tokio::time::timeout(self.timeout, self.bookmarks.search(&account, query))
            .await
            .map_err(|_| Error::Timeout {
                what: "bookmark search",
                after: self.timeout,
            })??;

        tracing::debug!(user_id = user_id.0, hits = bookmarks.len(), "bookmark search");
        Ok(SearchOutcome::Hits(
            bookmarks.into_iter().map(search_hit).collect(),
        ))
    }
}
