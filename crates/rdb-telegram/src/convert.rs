//! teloxide `Message` → core `InboundMessage`.
//!
//! Telegram measures entity offsets in UTF-16 code units; the core works on
//! byte ranges of the Rust string, so every entity is translated here.

use std::ops::Range;

use teloxide::types::{Chat, ForwardedFrom, Message, MessageEntity, MessageEntityKind, User};

use rdb_core::{
    domain::{ChatId, MessageId},
    message::{
        Attachment, AttachmentHandle, AttachmentKind, ForwardSource, InboundMessage, SpanKind,
        TextSpan,
    },
};

pub fn inbound_message(msg: &Message) -> InboundMessage {
    let text = msg.text().map(str::to_string);
    let text_spans = match (msg.text(), msg.entities()) {
        (Some(text), Some(entities)) => text_spans(text, entities),
        _ => Vec::new(),
    };
    let caption = msg.caption().map(str::to_string);
    let caption_spans = match (msg.caption(), msg.caption_entities()) {
        (Some(caption), Some(entities)) => self::text_spans(caption, entities),
        _ => Vec::new(),
    };

    InboundMessage {
        id: MessageId(msg.id.0),
        chat_id: ChatId(msg.chat.id.0),
        text,
        text_spans,
        caption,
        caption_spans,
        attachment: attachment(msg),
        is_forwarded: msg.forward().is_some(),
        forward_source: forward_source(msg),
    }
}

/// Original author of a forwarded message, when Telegram tells us.
pub fn forward_source(msg: &Message) -> Option<ForwardSource> {
    let forward = msg.forward()?;
    let source = match &forward.from {
        ForwardedFrom::SenderName(name) => ForwardSource {
            name: name.clone(),
            url: None,
        },
        ForwardedFrom::User(user) => user_source(user),
        ForwardedFrom::Chat(chat) => chat_source(chat, forward.message_id),
    };
    Some(source)
}

fn user_source(user: &User) -> ForwardSource {
    ForwardSource {
        name: user.full_name(),
        url: Some(user_url(user.username.as_deref(), user.id.0)),
    }
}

fn chat_source(chat: &Chat, message_id: Option<i32>) -> ForwardSource {
    let name = chat
        .title()
        .map(str::to_string)
        .or_else(|| {
            let first = chat.first_name()?;
            Some(match chat.last_name() {
                Some(last) => format!("{first} {last}"),
                None => first.to_string(),
            })
        })
        .unwrap_or_default();

    ForwardSource {
        name,
        url: chat.username().map(|u| chat_url(u, message_id)),
    }
}

pub fn user_url(username: Option<&str>, user_id: u64) -> String {
    match username {
        Some(username) if !username.is_empty() => format!("https://t.me/{username}"),
        _ => format!("tg://user?id={user_id}"),
    }
}

/// Public link to a channel or group, pointing at the post when known.
pub fn chat_url(username: &str, message_id: Option<i32>) -> String {
    match message_id {
        Some(id) => format!("https://t.me/{username}/{id}"),
        None => format!("https://t.me/{username}"),
    }
}

fn attachment(msg: &Message) -> Option<Attachment> {
    if let Some(photos) = msg.photo() {
        // Sizes come smallest first.
        let best = photos.last()?;
        return Some(Attachment {
            kind: AttachmentKind::Photo,
            handle: AttachmentHandle(best.file.id.clone()),
            size: u64::from(best.file.size),
            mime: None,
            file_name: None,
        });
    }

    if let Some(video) = msg.video() {
        return Some(Attachment {
            kind: AttachmentKind::Video,
            handle: AttachmentHandle(video.file.id.clone()),
            size: u64::from(video.file.size),
            mime: video.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            file_name: video.file_name.clone(),
        });
    }

    if let Some(doc) = msg.document() {
        return Some(Attachment {
            kind: AttachmentKind::Document,
            handle: AttachmentHandle(doc.file.id.clone()),
            size: u64::from(doc.file.size),
            mime: doc.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            file_name: doc.file_name.clone(),
        });
    }

    None
}

pub fn text_spans(text: &str, entities: &[MessageEntity]) -> Vec<TextSpan> {
    entities
        .iter()
        .filter_map(|e| {
            let kind = span_kind(&e.kind)?;
            let range = utf16_range_to_bytes(text, e.offset, e.length)?;
            Some(TextSpan::new(range, kind))
        })
        .collect()
}

fn span_kind(kind: &MessageEntityKind) -> Option<SpanKind> {
    Some(match kind {
        MessageEntityKind::Bold => SpanKind::Bold,
        MessageEntityKind::Italic => SpanKind::Italic,
        MessageEntityKind::Underline => SpanKind::Underline,
        MessageEntityKind::Strikethrough => SpanKind::Strikethrough,
        MessageEntityKind::Code => SpanKind::Code,
        MessageEntityKind::Pre { .. } => SpanKind::Pre,
        MessageEntityKind::Url => SpanKind::Url,
        MessageEntityKind::TextLink { url } => SpanKind::TextLink {
            url: url.to_string(),
        },
        _ => return None,
    })
}

/// Convert a UTF-16 `offset`/`length` pair into a byte range of `text`.
///
/// Returns `None` when either end falls outside the text or inside a
/// surrogate pair.
pub fn utf16_range_to_bytes(text: &str, offset: usize, length: usize) -> Option<Range<usize>> {
    let end_units = offset.checked_add(length)?;
    let mut units = 0usize;
    let mut start = None;
    let mut end = None;

    for (idx, ch) in text.char_indices() {
        if units == offset {
            start = Some(idx);
        }
        if units == end_units {
            end = Some(idx);
            break;
        }
        units += ch.len_utf16();
    }
    if units == offset && start.is_none() {
        start = Some(text.len());
    }
    if units == end_units && end.is_none() {
        end = Some(text.len());
    }

    Some(start?..end?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_offsets_map_one_to_one() {
        assert_eq!(utf16_range_to_bytes("hello world", 6, 5), Some(6..11));
        assert_eq!(utf16_range_to_bytes("hello", 0, 5), Some(0..5));
        assert_eq!(utf16_range_to_bytes("hello", 5, 0), Some(5..5));
    }

    #[test]
    fn cyrillic_and_emoji_offsets_are_translated() {
        // "при" is 3 UTF-16 units and 6 bytes; the emoji is 2 units and 4 bytes.
        let text = "при 😀 link";
        let range = utf16_range_to_bytes(text, 7, 4).unwrap();
        assert_eq!(&text[range], "link");

        let emoji = utf16_range_to_bytes(text, 4, 2).unwrap();
        assert_eq!(&text[emoji], "😀");
    }

    #[test]
    fn out_of_range_and_split_surrogates_are_rejected() {
        assert_eq!(utf16_range_to_bytes("abc", 2, 5), None);
        assert_eq!(utf16_range_to_bytes("😀", 1, 1), None);
        assert_eq!(utf16_range_to_bytes("abc", usize::MAX, 2), None);
    }

    #[test]
    fn entities_become_spans() {
        let text = "📰 read the article";
        let entities = vec![
            MessageEntity::bold(0, 2),
            MessageEntity::text_link(
                "https://x.test/a".parse().unwrap(),
                12,
                7,
            ),
            MessageEntity::new(MessageEntityKind::Mention, 3, 4),
        ];

        let spans = text_spans(text, &entities);

        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].range.clone()], "📰");
        assert_eq!(spans[0].kind, SpanKind::Bold);
        assert_eq!(&text[spans[1].range.clone()], "article");
        assert_eq!(
            spans[1].kind,
            SpanKind::TextLink {
                url: "https://x.test/a".to_string()
            }
        );
    }

    #[test]
    fn provenance_urls() {
        assert_eq!(user_url(Some("alice"), 1), "https://t.me/alice");
        assert_eq!(user_url(None, 42), "tg://user?id=42");
        assert_eq!(user_url(Some(""), 42), "tg://user?id=42");
        assert_eq!(chat_url("news", Some(7)), "https://t.me/news/7");
        assert_eq!(chat_url("news", None), "https://t.me/news");
    }

    #[test]
    fn forwarded_channel_post_is_converted() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "message_id": 15,
            "date": 1700000000,
            "chat": {"id": 10, "type": "private", "first_name": "Alice"},
            "from": {"id": 10, "is_bot": false, "first_name": "Alice"},
            "forward_from_chat": {"id": -100123, "type": "channel", "title": "News", "username": "news"},
            "forward_from_message_id": 99,
            "forward_date": 1699999999,
            "text": "Headline https://x.test",
            "entities": [{"type": "url", "offset": 9, "length": 14}]
        }))
        .unwrap();

        let inbound = inbound_message(&msg);

        assert!(inbound.is_forwarded);
        assert_eq!(inbound.id, MessageId(15));
        assert_eq!(
            inbound.forward_source,
            Some(ForwardSource {
                name: "News".into(),
                url: Some("https://t.me/news/99".into()),
            })
        );
        let links = inbound.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://x.test");
    }
}
