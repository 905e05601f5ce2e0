use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs/usage records).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== URL Helpers ==============

/// Finds http(s) URLs inside free text.
pub fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"https?://(?:www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,16}\b[-a-zA-Z0-9()@:%_+.~#?&/=]*",
        )
        .expect("valid url regex")
    })
}

/// Text with every URL removed; what a reader sees besides the links.
pub fn strip_urls(text: &str) -> String {
    url_regex().replace_all(text, "").into_owned()
}

/// Give scheme-less link text (`example.com/a`, `t.me/x`) an https scheme.
pub fn absolute_url(raw: &str) -> String {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    if raw.contains("://") || lower.starts_with("mailto:") || lower.starts_with("tg:") {
        return raw.to_string();
    }
    format!("https://{raw}")
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

// ============== Text Helpers ==============

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// First `max_chars` characters, no ellipsis.
pub fn take_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
