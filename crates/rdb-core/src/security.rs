use std::fmt;

use crate::{
    domain::{BookmarkAccount, UserId},
    ports::UserStore,
    Result,
};

// ============== Handler Policy ==============

/// Access requirements and behavior of one update handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandlerPolicy {
    /// The sender must have a user record with a bookmark account.
    pub requires_registration: bool,
    /// Only the configured admin may use the handler.
    pub admin_only: bool,
    /// Forwarded messages are grouped into posts before classification.
    pub stack_forwarded: bool,
}

impl HandlerPolicy {
    /// Forwarded posts: registered users, batched.
    pub const FORWARDS: Self = Self {
        requires_registration: true,
        admin_only: false,
        stack_forwarded: true,
    };

    /// Links and text sent directly to the bot.
    pub const DIRECT: Self = Self {
        requires_registration: true,
        admin_only: false,
        stack_forwarded: false,
    };

    /// Inline search over saved bookmarks.
    pub const INLINE: Self = Self {
        requires_registration: true,
        admin_only: false,
        stack_forwarded: false,
    };
}

// ============== Authorization ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    AdminOnly,
    NotRegistered,
    NoBookmarkAccount,
}

impl Denial {
    pub fn user_hint(self) -> &'static str {
        match self {
            Denial::AdminOnly => "⛔ This action is available to the bot admin only.",
            Denial::NotRegistered => {
                "👋 You are not registered yet. Ask the bot admin to add you first."
            }
            Denial::NoBookmarkAccount => {
                "🔑 Your Raindrop.io account is not connected yet. Add your API token first."
            }
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::AdminOnly => f.write_str("admin only"),
            Denial::NotRegistered => f.write_str("not registered"),
            Denial::NoBookmarkAccount => f.write_str("no bookmark account"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    /// `account` is set whenever the user has connected one.
    Allowed { account: Option<BookmarkAccount> },
    Denied(Denial),
}

pub fn is_admin(user_id: UserId, admin_id: Option<i64>) -> bool {
    admin_id == Some(user_id.0)
}

/// Check `user_id` against `policy`, looking the user up only when needed.
pub async fn authorize(
    policy: HandlerPolicy,
    user_id: UserId,
    admin_id: Option<i64>,
    users: &dyn UserStore,
) -> Result<AccessDecision> {
    if policy.admin_only && !is_admin(user_id, admin_id) {
        return Ok(AccessDecision::Denied(Denial::AdminOnly));
    }

    let record = users.find(user_id).await?;
    let account = record.as_ref().and_then(|r| r.bookmark_account());

    if policy.requires_registration {
        if record.is_none() {
            return Ok(AccessDecision::Denied(Denial::NotRegistered));
        }
        if account.is_none() {
            return Ok(AccessDecision::Denied(Denial::NoBookmarkAccount));
        }
    }

    Ok(AccessDecision::Allowed { account })
}
