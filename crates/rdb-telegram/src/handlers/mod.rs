//! Telegram update handlers.
//!
//! The message endpoint only converts the update and picks a policy. The
//! actual work (access check, forward batching, classification, saving) runs
//! on a spawned task, so teloxide never holds up the next update of a chat
//! while a debounce window is open. Inline queries are answered in place.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use rdb_core::{domain::UserId, security::HandlerPolicy};

use crate::{convert, router::AppState};

mod inline;
mod save;

pub use inline::{article, handle_inline_query};
pub use save::save_message;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }

    let inbound = convert::inbound_message(&msg);
    if !inbound.is_forwarded && inbound.text.as_deref().is_some_and(|t| t.starts_with('/')) {
        tracing::debug!(chat_id = msg.chat.id.0, "ignoring bot command");
        return Ok(());
    }

    let policy = if inbound.is_forwarded {
        HandlerPolicy::FORWARDS
    } else {
        HandlerPolicy::DIRECT
    };
    let user_id = UserId(user.id.0 as i64);

    tokio::spawn(save_message(state, user_id, inbound, policy));
    Ok(())
}
