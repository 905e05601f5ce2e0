use std::sync::Arc;

use rdb_core::{
    aggregator::{Batch, Outcome},
    compose::escape_html,
    domain::{ChatId, Recipient, SenderIdentity, UserId},
    message::InboundMessage,
    security::{authorize, AccessDecision, Denial, HandlerPolicy},
};

use crate::router::AppState;

const LOOKUP_FAILED: &str = "❌ Something went wrong while checking your account. Please try again later.";

/// Access check → batching → classification → save, for one inbound message.
pub async fn save_message(
    state: Arc<AppState>,
    user_id: UserId,
    inbound: InboundMessage,
    policy: HandlerPolicy,
) {
    let chat_id = inbound.chat_id;

    let decision = authorize(
        policy,
        user_id,
        state.cfg.admin_telegram_id,
        state.users.as_ref(),
    )
    .await;
    let account = match decision {
        Ok(AccessDecision::Allowed {
            account: Some(account),
        }) => account,
        Ok(AccessDecision::Allowed { account: None }) => {
            reply(&state, chat_id, Denial::NoBookmarkAccount.user_hint()).await;
            return;
        }
        Ok(AccessDecision::Denied(denial)) => {
            tracing::info!(user_id = user_id.0, %denial, "access denied");
            reply(&state, chat_id, denial.user_hint()).await;
            return;
        }
        Err(e) => {
            tracing::warn!(user_id = user_id.0, error = %e, "user lookup failed");
            reply(&state, chat_id, LOOKUP_FAILED).await;
            return;
        }
    };

    let sender = SenderIdentity(user_id);
    let outcome = if policy.stack_forwarded {
        state.aggregator.handle(sender, inbound).await
    } else {
        Outcome::Finalized(Batch {
            sender,
            messages: vec![inbound],
        })
    };
    let Outcome::Finalized(batch) = outcome else {
        return;
    };

    let decision = state.classifier.classify_batch(&batch.messages);
    tracing::debug!(
        user_id = user_id.0,
        messages = batch.len(),
        decision = decision.kind(),
        "classified"
    );

    let recipient = Recipient {
        user_id,
        chat_id,
        account,
    };
    // The dispatcher already acknowledged the failure to the user.
    if let Err(e) = state.dispatcher.dispatch(decision, &recipient).await {
        tracing::debug!(user_id = user_id.0, error = %e, "save finished with an error");
    }
}

async fn reply(state: &AppState, chat_id: ChatId, text: &str) {
    if let Err(e) = state.messenger.send_html(chat_id, &escape_html(text)).await {
        tracing::warn!(chat_id = chat_id.0, error = %e, "failed to reply");
    }
}
