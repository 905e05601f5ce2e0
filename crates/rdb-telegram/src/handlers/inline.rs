use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{
        InlineQuery, InlineQueryResult, InlineQueryResultArticle, InputMessageContent,
        InputMessageContentText, ParseMode,
    },
};

use rdb_core::{
    domain::UserId,
    search::{SearchHit, SearchOutcome},
    security::Denial,
};

use crate::router::AppState;

const RESULTS_CACHE_SECS: u32 = 300;
const DENIED_CACHE_SECS: u32 = 1;
const SWITCH_PM_PARAMETER: &str = "register";

/// Inline result for one bookmark; posts the bookmark as a linked title.
pub fn article(hit: SearchHit) -> InlineQueryResult {
    let content = InputMessageContent::Text(
        InputMessageContentText::new(hit.message_html).parse_mode(ParseMode::Html),
    );
    let mut article = InlineQueryResultArticle::new(hit.id, hit.title, content);
    if let Some(description) = hit.description {
        article = article.description(description);
    }
    if let Ok(url) = reqwest::Url::parse(&hit.url) {
        article = article.url(url);
    }
    if let Some(thumb) = hit.thumb_url.and_then(|t| reqwest::Url::parse(&t).ok()) {
        article = article.thumb_url(thumb);
    }
    InlineQueryResult::Article(article)
}

fn switch_pm_text(denial: Denial) -> &'static str {
    match denial {
        Denial::NoBookmarkAccount => "Connect your Raindrop.io account first",
        Denial::AdminOnly | Denial::NotRegistered => {
            "You need to register first. Click here to do this"
        }
    }
}

pub async fn handle_inline_query(
    bot: Bot,
    q: InlineQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let user_id = UserId(q.from.id.0 as i64);

    let outcome = match state.search.search(user_id, &q.query).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(user_id = user_id.0, error = %e, "inline search failed");
            SearchOutcome::Hits(Vec::new())
        }
    };

    let answer = match outcome {
        SearchOutcome::Hits(hits) => {
            let results: Vec<InlineQueryResult> = hits.into_iter().map(article).collect();
            bot.answer_inline_query(q.id, results)
                .cache_time(RESULTS_CACHE_SECS)
                .is_personal(true)
                .await
        }
        SearchOutcome::Denied(denial) => {
            tracing::info!(user_id = user_id.0, %denial, "inline search denied");
            bot.answer_inline_query(q.id, Vec::<InlineQueryResult>::new())
                .cache_time(DENIED_CACHE_SECS)
                .is_personal(true)
                .switch_pm_text(switch_pm_text(denial))
                .switch_pm_parameter(SWITCH_PM_PARAMETER)
                .await
        }
    };

    if let Err(e) = answer {
        tracing::warn!(user_id = user_id.0, error = %e, "failed to answer inline query");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn hit() -> SearchHit {
        SearchHit {
            id: "42".into(),
            title: "Fish & Chips".into(),
            description: Some("Best in town".into()),
            url: "https://x.test/fish".into(),
            thumb_url: Some("not a url".into()),
            message_html: "<b>Fish &amp; Chips</b>".into(),
        }
    }

    #[test]
    fn article_carries_bookmark_fields() {
        let json: Value = serde_json::to_value(article(hit())).unwrap();

        assert_eq!(json["type"], "article");
        assert_eq!(json["id"], "42");
        assert_eq!(json["title"], "Fish & Chips");
        assert_eq!(json["description"], "Best in town");
        assert_eq!(json["url"], "https://x.test/fish");
        assert_eq!(
            json["input_message_content"]["message_text"],
            "<b>Fish &amp; Chips</b>"
        );
        // Unparseable thumbnails are dropped rather than failing the answer.
        assert!(json.get("thumb_url").map_or(true, Value::is_null));
    }

    #[test]
    fn denied_users_get_a_short_prompt() {
        for denial in [Denial::NotRegistered, Denial::NoBookmarkAccount, Denial::AdminOnly] {
            // Telegram caps switch_pm_text at 64 characters.
            assert!(switch_pm_text(denial).chars().count() <= 64);
        }
    }
}
