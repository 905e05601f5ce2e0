//! Transport-agnostic snapshot of an incoming chat message.
//!
//! The Telegram adapter converts teloxide messages into [`InboundMessage`];
//! everything downstream (aggregation, classification, composing) works on
//! this model only.

use std::ops::Range;

use crate::{
    domain::{ChatId, MessageId},
    utils::{absolute_url, strip_urls},
};

/// Formatting or link annotation over a byte range of the message text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Pre,
    /// A bare URL typed into the text; the target is the covered text itself.
    Url,
    /// Anchor text pointing at `url`.
    TextLink { url: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSpan {
    /// Byte range into the text the span belongs to. Always on char boundaries.
    pub range: Range<usize>,
    pub kind: SpanKind,
}

impl TextSpan {
    pub fn new(range: Range<usize>, kind: SpanKind) -> Self {
        Self { range, kind }
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, SpanKind::Url | SpanKind::TextLink { .. })
    }
}

/// A hyperlink found in a message: where it points and what the reader sees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub anchor: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Video,
    Document,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Photo => "photo",
            AttachmentKind::Video => "video",
            AttachmentKind::Document => "document",
        }
    }
}

/// Opaque handle the transport resolves into the attachment bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentHandle(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub handle: AttachmentHandle,
    pub size: u64,
    pub mime: Option<String>,
    pub file_name: Option<String>,
}

/// Original author of a forwarded message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardSource {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Source-assigned sequence number; monotonic per chat but not contiguous.
    pub id: MessageId,
    pub chat_id: ChatId,
    pub text: Option<String>,
    pub text_spans: Vec<TextSpan>,
    pub caption: Option<String>,
    pub caption_spans: Vec<TextSpan>,
    pub attachment: Option<Attachment>,
    pub is_forwarded: bool,
    pub forward_source: Option<ForwardSource>,
}

impl InboundMessage {
    /// Plain text message, not forwarded, without annotations.
    pub fn new(id: i32, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            id: MessageId(id),
            chat_id: ChatId(chat_id),
            text: Some(text.into()),
            text_spans: Vec::new(),
            caption: None,
            caption_spans: Vec::new(),
            attachment: None,
            is_forwarded: false,
            forward_source: None,
        }
    }

    /// Media message with an optional caption.
    pub fn media(id: i32, chat_id: i64, attachment: Attachment, caption: Option<String>) -> Self {
        Self {
            id: MessageId(id),
            chat_id: ChatId(chat_id),
            text: None,
            text_spans: Vec::new(),
            caption,
            caption_spans: Vec::new(),
            attachment: Some(attachment),
            is_forwarded: false,
            forward_source: None,
        }
    }

    pub fn forwarded_from(mut self, source: Option<ForwardSource>) -> Self {
        self.is_forwarded = true;
        self.forward_source = source;
        self
    }

    /// Attach spans to whichever text is effective (caption wins over body).
    pub fn with_spans(mut self, spans: Vec<TextSpan>) -> Self {
        if self.caption.is_some() {
            self.caption_spans = spans;
        } else {
            self.text_spans = spans;
        }
        self
    }

    /// Caption when present, otherwise the body text, with its spans.
    pub fn content(&self) -> Option<(&str, &[TextSpan])> {
        if let Some(caption) = self.caption.as_deref() {
            return Some((caption, &self.caption_spans));
        }
        self.text
            .as_deref()
            .map(|text| (text, self.text_spans.as_slice()))
    }

    pub fn plain_text(&self) -> &str {
        self.content().map(|(text, _)| text).unwrap_or("")
    }

    /// Text a reader sees besides the links: bare URL spans and anything the
    /// URL pattern matches are removed.
    pub fn visible_text(&self) -> String {
        let Some((text, spans)) = self.content() else {
            return String::new();
        };

        let mut urls: Vec<&Range<usize>> = spans
            .iter()
            .filter(|s| s.kind == SpanKind::Url && text.get(s.range.clone()).is_some())
            .map(|s| &s.range)
            .collect();
        urls.sort_by_key(|r| r.start);

        let mut kept = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for range in urls {
            if range.start >= cursor {
                kept.push_str(&text[cursor..range.start]);
            }
            cursor = cursor.max(range.end);
        }
        kept.push_str(&text[cursor..]);

        strip_urls(&kept)
    }

    /// Hyperlinks in order of appearance. Spans with ranges that do not fit the
    /// text are skipped.
    pub fn links(&self) -> Vec<Link> {
        let Some((text, spans)) = self.content() else {
            return Vec::new();
        };

        let mut spans: Vec<&TextSpan> = spans.iter().filter(|s| s.is_link()).collect();
        spans.sort_by_key(|s| s.range.start);

        spans
            .into_iter()
            .filter_map(|span| {
                let anchor = text.get(span.range.clone())?.to_string();
                let url = match &span.kind {
                    SpanKind::TextLink { url } => url.clone(),
                    _ => absolute_url(&anchor),
                };
                Some(Link { url, anchor })
            })
            .collect()
    }
}
