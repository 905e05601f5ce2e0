//! Telegram adapter (teloxide).
//!
//! Implements the `rdb-core` MessagingPort over the Telegram Bot API and turns
//! incoming updates into core messages.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{net::Download, prelude::*, types::ParseMode};

use tokio::time::sleep;

pub mod convert;
pub mod handlers;
pub mod router;

use rdb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    message::AttachmentHandle,
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Collaborator(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true)
        })
        .await?;
        Ok(())
    }

    async fn fetch_attachment(&self, handle: &AttachmentHandle) -> Result<Vec<u8>> {
        let file = self
            .with_retry(|| self.bot.get_file(handle.0.clone()))
            .await?;

        // A self-hosted Bot API server in --local mode hands out absolute paths
        // on its own disk instead of download paths.
        let local = Path::new(&file.path);
        if local.is_absolute() && tokio::fs::try_exists(local).await.unwrap_or(false) {
            return Ok(tokio::fs::read(local).await?);
        }

        let mut bytes = Vec::new();
        self.bot
            .download_file(&file.path, &mut bytes)
            .await
            .map_err(|e| Error::Collaborator(format!("telegram download error: {e}")))?;

        tracing::debug!(bytes = bytes.len(), "attachment downloaded");
        Ok(bytes)
    }
}
