/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Key under which forwarded messages are grouped into one post.
///
/// Stable per originating user, not per chat: the same person forwarding into
/// two chats with the bot still builds one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SenderIdentity(pub UserId);

/// Where acknowledgments for a dispatch go, and whose bookmark account is used.
#[derive(Clone, Debug)]
pub struct Recipient {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub account: BookmarkAccount,
}

/// Credentials for the bookmark service on behalf of one user.
#[derive(Clone, PartialEq, Eq)]
pub struct BookmarkAccount {
    pub api_token: String,
}

impl std::fmt::Debug for BookmarkAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookmarkAccount")
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Reference to a bookmark created in the bookmark service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BookmarkRef(pub i64);
