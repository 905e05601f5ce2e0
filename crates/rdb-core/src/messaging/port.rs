use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    message::AttachmentHandle,
    Result,
};

/// Chat transport port.
///
/// Besides acknowledgments it also resolves attachment handles, since only
/// the transport knows where the bytes of a forwarded file live.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;

    /// Download the bytes behind an attachment handle.
    async fn fetch_attachment(&self, handle: &AttachmentHandle) -> Result<Vec<u8>>;
}
