//! Decides how a post gets saved: as a link, as an attachment, as a composed
//! HTML document, or not at all.
//!
//! Classification is pure. Everything that needs I/O (downloading attachments,
//! uploading images and HTML) is described by the decision and carried out by
//! the dispatcher.

use std::fmt;

use crate::{
    compose::{
        byline_fragment, guess_title, placeholder_fragment, text_fragment, DocumentDraft,
        Fragment, ImageRef,
    },
    message::{Attachment, AttachmentHandle, AttachmentKind, ForwardSource, InboundMessage, Link},
    utils::{char_len, truncate_text},
};

/// Telegram's cloud Bot API refuses downloads above 20 MB.
pub const BOT_API_MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;
/// Ceiling when files are fetched through a self-hosted Bot API server.
pub const LOCAL_BOT_API_MAX_ATTACHMENT_BYTES: u64 = 100 * 1024 * 1024;

/// Mime types the image host accepts for embedding.
pub const EMBEDDABLE_IMAGE_MIME: &[&str] = &["image/jpeg", "image/png", "image/gif"];

const LONGREAD_MIN_CHARS: usize = 100;
const ANNOUNCEMENT_MAX_CHARS: usize = 700;
const ANCHOR_MIN_CHARS: usize = 4;
const EXCERPT_CHARS: usize = 200;

/// How attachment bytes are fetched from Telegram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportPath {
    #[default]
    BotApi,
    LocalBotApi,
}

impl TransportPath {
    pub fn max_attachment_bytes(self) -> u64 {
        match self {
            TransportPath::BotApi => BOT_API_MAX_ATTACHMENT_BYTES,
            TransportPath::LocalBotApi => LOCAL_BOT_API_MAX_ATTACHMENT_BYTES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    AttachmentTooLarge { size: u64, limit: u64 },
    Empty,
}

impl RejectReason {
    /// Hint shown to the user instead of a save confirmation.
    pub fn user_hint(&self) -> String {
        match self {
            RejectReason::TooShort => {
                "🤔 This message is too short to be a longread. Send me a link or forward a longer post."
                    .to_string()
            }
            RejectReason::AttachmentTooLarge { limit, .. } => format!(
                "📦 This attachment is too large. I can only save files up to {} MB.",
                limit / (1024 * 1024)
            ),
            RejectReason::Empty => "🤷 There is nothing I could save here.".to_string(),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooShort => f.write_str("too short to be a longread"),
            RejectReason::AttachmentTooLarge { .. } => f.write_str("attachment too large"),
            RejectReason::Empty => f.write_str("nothing to save"),
        }
    }
}

/// A single attachment to save as a bookmark file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentSave {
    pub handle: AttachmentHandle,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub title: String,
    pub source_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassificationDecision {
    SaveLink { url: String },
    SaveAttachment(AttachmentSave),
    SaveDocument(DocumentDraft),
    Reject(RejectReason),
}

impl ClassificationDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassificationDecision::SaveLink { .. } => "link",
            ClassificationDecision::SaveAttachment(_) => "attachment",
            ClassificationDecision::SaveDocument(_) => "document",
            ClassificationDecision::Reject(_) => "reject",
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Classifier {
    transport: TransportPath,
}

impl Classifier {
    pub fn new(transport: TransportPath) -> Self {
        Self { transport }
    }

    /// Classify one message.
    pub fn classify(&self, msg: &InboundMessage) -> ClassificationDecision {
        let text = msg.plain_text();
        let links = msg.links();
        let visible_len = char_len(&msg.visible_text());

        if msg.attachment.is_none() && links.is_empty() && visible_len < LONGREAD_MIN_CHARS {
            return ClassificationDecision::Reject(RejectReason::TooShort);
        }

        if !links.is_empty() && visible_len < ANNOUNCEMENT_MAX_CHARS {
            if let Some(url) = single_link_target(&links) {
                return ClassificationDecision::SaveLink { url };
            }
        }

        if let Some(attachment) = &msg.attachment {
            let limit = self.transport.max_attachment_bytes();
            if attachment.size > limit {
                return ClassificationDecision::Reject(RejectReason::AttachmentTooLarge {
                    size: attachment.size,
                    limit,
                });
            }

            let name = attachment_name(attachment, msg);
            let title = if text.trim().is_empty() {
                name.clone()
            } else {
                guess_title(text)
            };
            return ClassificationDecision::SaveAttachment(AttachmentSave {
                handle: attachment.handle.clone(),
                mime: attachment_mime(attachment),
                size: attachment.size,
                source_url: msg.forward_source.as_ref().and_then(|s| s.url.clone()),
                name,
                title,
            });
        }

        let mut fragments = Vec::new();
        fragments.extend(byline_fragment(msg));
        fragments.extend(text_fragment(msg));

        ClassificationDecision::SaveDocument(DocumentDraft {
            title: guess_title(text),
            excerpt: excerpt(text),
            fragments,
        })
    }

    /// Classify a finalized batch, already in post order.
    pub fn classify_batch(&self, msgs: &[InboundMessage]) -> ClassificationDecision {
        match msgs {
            [] => ClassificationDecision::Reject(RejectReason::Empty),
            [only] => self.classify(only),
            _ => ClassificationDecision::SaveDocument(self.compose_batch(msgs)),
        }
    }

    fn compose_batch(&self, msgs: &[InboundMessage]) -> DocumentDraft {
        let mut fragments = Vec::new();
        let mut previous_source: Option<&ForwardSource> = None;

        for (idx, msg) in msgs.iter().enumerate() {
            let source = msg.forward_source.as_ref();
            // One byline per run of messages from the same author.
            if idx == 0 || source != previous_source {
                fragments.extend(byline_fragment(msg));
            }
            previous_source = source;

            if let Some(attachment) = &msg.attachment {
                fragments.push(self.attachment_fragment(attachment, msg));
            }
            fragments.extend(text_fragment(msg));
        }

        let text = msgs
            .iter()
            .map(|m| m.plain_text().trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        DocumentDraft {
            title: guess_title(&text),
            excerpt: excerpt(&text),
            fragments,
        }
    }

    fn attachment_fragment(&self, attachment: &Attachment, msg: &InboundMessage) -> Fragment {
        let name = attachment_name(attachment, msg);
        let mime = attachment_mime(attachment);

        if !is_embeddable_image(attachment.kind, &mime) {
            return placeholder_fragment(attachment.kind.as_str(), &name);
        }
        if attachment.size > self.transport.max_attachment_bytes() {
            return placeholder_fragment("image too large", &name);
        }

        Fragment::Image(ImageRef {
            handle: attachment.handle.clone(),
            name,
            mime,
            size: attachment.size,
        })
    }
}

/// The URL every real link points at, if they agree.
///
/// Links whose visible anchor is blank or shorter than 4 characters are
/// decorative and do not take part in the comparison; the last of them is used
/// only when no other link exists.
pub fn single_link_target(links: &[Link]) -> Option<String> {
    let mut target: Option<&str> = None;
    let mut decorative: Option<&str> = None;

    for link in links {
        if is_decorative_anchor(&link.anchor) {
            decorative = Some(&link.url);
            continue;
        }
        match target {
            None => target = Some(&link.url),
            Some(t) if t == link.url => {}
            Some(_) => return None,
        }
    }

    target.or(decorative).map(str::to_string)
}

fn is_decorative_anchor(anchor: &str) -> bool {
    char_len(anchor.trim()) < ANCHOR_MIN_CHARS
}

pub fn is_embeddable_image(kind: AttachmentKind, mime: &str) -> bool {
    kind == AttachmentKind::Photo || EMBEDDABLE_IMAGE_MIME.contains(&mime)
}

fn attachment_mime(attachment: &Attachment) -> String {
    if let Some(mime) = attachment.mime.as_deref().filter(|m| !m.trim().is_empty()) {
        return mime.to_string();
    }
    match attachment.kind {
        AttachmentKind::Photo => "image/jpeg".to_string(),
        AttachmentKind::Video => "video/mp4".to_string(),
        AttachmentKind::Document => "application/octet-stream".to_string(),
    }
}

fn attachment_name(attachment: &Attachment, msg: &InboundMessage) -> String {
    if let Some(name) = attachment.file_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    let ext = extension_for_mime(&attachment_mime(attachment));
    format!("{}_{}.{ext}", attachment.kind.as_str(), msg.id.0)
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "text/plain" => "txt",
        _ => "bin",
    }
}

fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_text(&collapsed, EXCERPT_CHARS)
}
