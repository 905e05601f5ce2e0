use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use rdb_core::{
    aggregator::Aggregator,
    classifier::Classifier,
    config::Config,
    dispatcher::{Collaborators, Dispatcher as SaveDispatcher},
    messaging::port::MessagingPort,
    ports::{BookmarkService, ImageHost, PasteService, UsageTracker, UserStore},
    search::BookmarkSearch,
};

use crate::handlers;
use crate::TelegramMessenger;

/// Collaborators that do not depend on the bot instance.
#[derive(Clone)]
pub struct Services {
    pub bookmarks: Arc<dyn BookmarkService>,
    pub paste: Arc<dyn PasteService>,
    pub images: Arc<dyn ImageHost>,
    pub usage: Arc<dyn UsageTracker>,
    pub users: Arc<dyn UserStore>,
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub users: Arc<dyn UserStore>,
    pub aggregator: Arc<Aggregator>,
    pub classifier: Classifier,
    pub dispatcher: Arc<SaveDispatcher>,
    pub search: Arc<BookmarkSearch>,
}

impl AppState {
    pub fn new(cfg: Arc<Config>, messenger: Arc<dyn MessagingPort>, services: Services) -> Self {
        let search = BookmarkSearch::new(
            services.bookmarks.clone(),
            services.users.clone(),
            cfg.admin_telegram_id,
            cfg.collaborator_timeout,
        );
        let dispatcher = SaveDispatcher::new(
            Collaborators {
                messenger: messenger.clone(),
                bookmarks: services.bookmarks,
                paste: services.paste,
                images: services.images,
                usage: services.usage,
            },
            cfg.collaborator_timeout,
        )
        .with_transfer_timeout(cfg.transfer_timeout);

        Self {
            aggregator: Arc::new(Aggregator::new(cfg.forward_debounce)),
            classifier: Classifier::new(cfg.transport_path()),
            dispatcher: Arc::new(dispatcher),
            search: Arc::new(search),
            users: services.users,
            messenger,
            cfg,
        }
    }
}

pub fn build_bot(cfg: &Config) -> anyhow::Result<Bot> {
    // Attachment downloads share the bot's client, so its request timeout has
    // to cover a full transfer.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(cfg.transfer_timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build telegram http client: {e}"))?;
    let bot = Bot::with_client(cfg.telegram_bot_token.clone(), client);
    let Some(api_url) = cfg.telegram_api_url.as_deref() else {
        return Ok(bot);
    };
    let url = reqwest::Url::parse(api_url)
        .map_err(|e| anyhow::anyhow!("TELEGRAM_API_URL is not a valid url: {e}"))?;
    Ok(bot.set_api_url(url))
}

pub async fn run_polling(cfg: Arc<Config>, services: Services) -> anyhow::Result<()> {
    let bot = build_bot(&cfg)?;

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }
    tracing::info!(
        transport = ?cfg.transport_path(),
        debounce_ms = cfg.forward_debounce.as_millis() as u64,
        timeout_ms = cfg.collaborator_timeout.as_millis() as u64,
        transfer_timeout_ms = cfg.transfer_timeout.as_millis() as u64,
        "forwarding pipeline ready"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let state = Arc::new(AppState::new(cfg, messenger, services));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_inline_query().endpoint(handlers::handle_inline_query));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
