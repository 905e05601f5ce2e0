//! HTML composing for posts saved as standalone documents.
//!
//! Message text is split into paragraphs on blank lines (code blocks stay
//! whole), rendered from its spans, and the whole post is wrapped in a fixed page template.
//! Images are kept as placeholders in a [`DocumentDraft`] until the dispatcher
//! has uploaded them and knows their URLs.

use std::ops::Range;

use crate::{
    errors::Error,
    message::{AttachmentHandle, ForwardSource, InboundMessage, SpanKind, TextSpan},
    utils::{absolute_url, char_len, take_chars, url_regex},
    Result,
};

pub const FALLBACK_TITLE: &str = "Forwarded post";

const TITLE_MAX_CHARS: usize = 100;
const TITLE_CUT_CHARS: usize = 60;

/// Escape HTML special characters.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// An image that still lives in the chat transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub handle: AttachmentHandle,
    pub name: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    Html(String),
    Image(ImageRef),
}

/// A composed post whose images are not uploaded yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentDraft {
    pub title: String,
    pub excerpt: String,
    pub fragments: Vec<Fragment>,
}

impl DocumentDraft {
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Image(img) => Some(img),
            Fragment::Html(_) => None,
        })
    }

    /// Render the final page. `image_urls` holds one URL per image fragment, in
    /// document order.
    pub fn render(&self, image_urls: &[String]) -> Result<String> {
        let mut urls = image_urls.iter();
        let mut body = String::new();

        for fragment in &self.fragments {
            match fragment {
                Fragment::Html(html) => body.push_str(html),
                Fragment::Image(img) => {
                    let url = urls.next().ok_or_else(|| {
                        Error::InvalidInput(format!("no uploaded url for image {}", img.name))
                    })?;
                    body.push_str(&format!(
                        r#"<figure><img src="{}" alt="{}"></figure>"#,
                        escape_html(url),
                        escape_html(&img.name)
                    ));
                }
            }
        }

        Ok(wrap_document(&self.title, &body))
    }
}

/// Wrap a rendered body into the standalone page template.
pub fn wrap_document(title: &str, body: &str) -> String {
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ max-width: 720px; margin: 2em auto; padding: 0 1em; font-family: Georgia, serif; line-height: 1.6; color: #222; }}
.forward-from {{ color: #777; font-size: 0.9em; }}
.attachment-placeholder {{ color: #777; font-style: italic; }}
figure {{ margin: 1em 0; }}
img {{ max-width: 100%; }}
pre, code {{ font-family: Menlo, monospace; }}
</style>
</head>
<body>
<article>
<h1>{title}</h1>
{body}
</article>
</body>
</html>
"#
    )
}

/// "Forwarded from" line for a post.
pub fn byline(source: &ForwardSource) -> String {
    let name = escape_html(&source.name);
    let link = match &source.url {
        Some(url) => format!(
            r#"<a href="{}" target="_blank" class="forward-source">{name}</a>"#,
            escape_html(url)
        ),
        None => format!(r#"<span class="forward-source">{name}</span>"#),
    };
    format!(r#"<p class="forward-from">Forwarded from: {link}</p>"#)
}

/// Byline fragment, when the message carries a usable forward source.
pub fn byline_fragment(msg: &InboundMessage) -> Option<Fragment> {
    let source = msg.forward_source.as_ref()?;
    if source.name.trim().is_empty() && source.url.is_none() {
        return None;
    }
    Some(Fragment::Html(byline(source)))
}

/// Paragraph HTML for the message text, if it has any.
pub fn text_fragment(msg: &InboundMessage) -> Option<Fragment> {
    let (text, spans) = msg.content()?;
    let html = paragraphs(text, spans);
    if html.is_empty() {
        return None;
    }
    Some(Fragment::Html(html))
}

/// Textual stand-in for an attachment that cannot be embedded.
pub fn placeholder_fragment(kind: &str, name: &str) -> Fragment {
    Fragment::Html(format!(
        r#"<p class="attachment-placeholder">[{}: {}]</p>"#,
        escape_html(kind),
        escape_html(name)
    ))
}

/// Split message text into `<p>` blocks on blank lines; single newlines
/// become `<br>`. Blank lines inside code spans never split a block, and `pre`
/// blocks are emitted on their own, outside any paragraph.
pub fn paragraphs(text: &str, spans: &[TextSpan]) -> String {
    let spans: Vec<TextSpan> = spans
        .iter()
        .filter(|s| s.range.start < s.range.end && text.get(s.range.clone()).is_some())
        .cloned()
        .collect();

    let mut out = String::new();
    for block in blocks(text, &spans) {
        for (piece, is_pre) in pre_pieces(&block, &spans) {
            let piece = if is_pre { piece } else { trim_newlines(text, piece) };
            if text[piece.clone()].trim().is_empty() {
                continue;
            }
            let html = render_rich_text(&text[piece.clone()], &clip_spans(&spans, &piece));
            if is_pre {
                out.push_str(&html);
            } else {
                out.push_str(&format!("<p>{}</p>", html.replace('\n', "<br>")));
            }
        }
    }
    out
}

fn is_unsplittable(span: &TextSpan) -> bool {
    matches!(span.kind, SpanKind::Code | SpanKind::Pre)
}

/// Byte ranges between blank-line separators not covered by a code span.
fn blocks(text: &str, spans: &[TextSpan]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for (idx, sep) in text.match_indices("\n\n") {
        let end = idx + sep.len();
        let covered = spans
            .iter()
            .any(|s| is_unsplittable(s) && s.range.start < end && s.range.end > idx);
        if covered {
            continue;
        }
        out.push(start..idx);
        start = end;
    }
    out.push(start..text.len());
    out
}

/// Cut a block around its `pre` spans. The flag marks the `pre` pieces.
fn pre_pieces(block: &Range<usize>, spans: &[TextSpan]) -> Vec<(Range<usize>, bool)> {
    let mut pres: Vec<Range<usize>> = spans
        .iter()
        .filter(|s| s.kind == SpanKind::Pre)
        .map(|s| s.range.start.max(block.start)..s.range.end.min(block.end))
        .filter(|r| r.start < r.end)
        .collect();
    pres.sort_by_key(|r| r.start);

    let mut pieces = Vec::new();
    let mut cursor = block.start;
    for pre in pres {
        if pre.start < cursor {
            continue;
        }
        if cursor < pre.start {
            pieces.push((cursor..pre.start, false));
        }
        cursor = pre.end;
        pieces.push((pre, true));
    }
    if cursor < block.end {
        pieces.push((cursor..block.end, false));
    }
    pieces
}

fn trim_newlines(text: &str, range: Range<usize>) -> Range<usize> {
    let s = &text[range.clone()];
    let start = range.start + (s.len() - s.trim_start_matches('\n').len());
    let end = range.end - (s.len() - s.trim_end_matches('\n').len());
    start..end.max(start)
}

/// Spans intersecting `piece`, re-based to the start of the piece.
fn clip_spans(spans: &[TextSpan], piece: &Range<usize>) -> Vec<TextSpan> {
    spans
        .iter()
        .filter_map(|s| {
            let start = s.range.start.max(piece.start);
            let end = s.range.end.min(piece.end);
            (start < end)
                .then(|| TextSpan::new(start - piece.start..end - piece.start, s.kind.clone()))
        })
        .collect()
}

/// Render message text with its spans as HTML. Text outside link spans gets
/// bare URLs autolinked.
pub fn render_rich_text(text: &str, spans: &[TextSpan]) -> String {
    let mut spans: Vec<&TextSpan> = spans
        .iter()
        .filter(|s| s.range.start < s.range.end && text.get(s.range.clone()).is_some())
        .collect();
    // Outer spans first when two start at the same place.
    spans.sort_by(|a, b| {
        a.range
            .start
            .cmp(&b.range.start)
            .then(b.range.end.cmp(&a.range.end))
    });

    let mut bounds: Vec<usize> = vec![0, text.len()];
    for s in &spans {
        bounds.push(s.range.start);
        bounds.push(s.range.end);
    }
    bounds.sort_unstable();
    bounds.dedup();

    let mut out = String::with_capacity(text.len() + 32);
    let mut open: Vec<&TextSpan> = Vec::new();
    let mut next = 0usize;

    for w in bounds.windows(2) {
        let (pos, end) = (w[0], w[1]);
        close_ending(&mut out, &mut open, pos, text);

        while next < spans.len() && spans[next].range.start == pos {
            out.push_str(&open_tag(spans[next], text));
            open.push(spans[next]);
            next += 1;
        }

        let segment = &text[pos..end];
        if open.iter().any(|s| s.is_link()) {
            out.push_str(&escape_html(segment));
        } else {
            out.push_str(&autolink(segment));
        }
    }

    while let Some(span) = open.pop() {
        out.push_str(close_tag(&span.kind));
    }

    out
}

/// Close every open span that ends at or before `pos`, reopening inner spans
/// that continue past it.
fn close_ending<'a>(out: &mut String, open: &mut Vec<&'a TextSpan>, pos: usize, text: &str) {
    if !open.iter().any(|s| s.range.end <= pos) {
        return;
    }

    let mut reopen = Vec::new();
    while let Some(top) = open.pop() {
        out.push_str(close_tag(&top.kind));
        if top.range.end > pos {
            reopen.push(top);
        }
        if !open.iter().any(|s| s.range.end <= pos) {
            break;
        }
    }

    for span in reopen.into_iter().rev() {
        out.push_str(&open_tag(span, text));
        open.push(span);
    }
}

fn open_tag(span: &TextSpan, text: &str) -> String {
    match &span.kind {
        SpanKind::Bold => "<b>".to_string(),
        SpanKind::Italic => "<i>".to_string(),
        SpanKind::Underline => "<u>".to_string(),
        SpanKind::Strikethrough => "<s>".to_string(),
        SpanKind::Code => "<code>".to_string(),
        SpanKind::Pre => "<pre>".to_string(),
        SpanKind::Url => link_open(&absolute_url(&text[span.range.clone()])),
        SpanKind::TextLink { url } => link_open(url),
    }
}

fn close_tag(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Bold => "</b>",
        SpanKind::Italic => "</i>",
        SpanKind::Underline => "</u>",
        SpanKind::Strikethrough => "</s>",
        SpanKind::Code => "</code>",
        SpanKind::Pre => "</pre>",
        SpanKind::Url | SpanKind::TextLink { .. } => "</a>",
    }
}

fn link_open(url: &str) -> String {
    format!(
        r#"<a href="{}" rel="nofollow" target="_blank">"#,
        escape_html(url)
    )
}

/// Escape `raw` and turn bare URLs into anchors.
pub fn autolink(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last = 0usize;
    for m in url_regex().find_iter(raw) {
        out.push_str(&escape_html(&raw[last..m.start()]));
        out.push_str(&link_open(m.as_str()));
        out.push_str(&escape_html(m.as_str()));
        out.push_str("</a>");
        last = m.end();
    }
    out.push_str(&escape_html(&raw[last..]));
    out
}

/// Guess a document title from its plain text: the first line if short, else
/// the first sentence if short, else a fixed-length prefix.
pub fn guess_title(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return FALLBACK_TITLE.to_string();
    }

    let first_line = text.split('\n').next().unwrap_or_default().trim();
    if !first_line.is_empty() && char_len(first_line) < TITLE_MAX_CHARS {
        return first_line.to_string();
    }

    let first_sentence = text.split(['.', '!', '?']).next().unwrap_or_default().trim();
    if !first_sentence.is_empty() && char_len(first_sentence) < TITLE_MAX_CHARS {
        return first_sentence.to_string();
    }

    take_chars(text, TITLE_CUT_CHARS).trim_end().to_string()
}
