use std::sync::Arc;

use rdb_core::{config::Config, usage::UsageLog, users::JsonUserStore};
use rdb_publish::{HtmlShareClient, TelegraphClient};
use rdb_raindrop::RaindropClient;
use rdb_telegram::router::Services;

#[tokio::main]
async fn main() -> Result<(), rdb_core::Error> {
    rdb_core::logging::init("rdb")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        user_store = %cfg.user_store_path.display(),
        usage_log = %cfg.usage_log_path.display(),
        "configuration loaded"
    );

    let services = Services {
        bookmarks: Arc::new(RaindropClient::with_base_url(cfg.raindrop_api_url.clone())?),
        paste: Arc::new(HtmlShareClient::new(
            cfg.htmlshare_base_url.clone(),
            cfg.htmlshare_password.clone(),
        )?),
        images: Arc::new(TelegraphClient::new(cfg.image_host_url.clone())?),
        usage: Arc::new(UsageLog::new(cfg.usage_log_path.clone())),
        users: Arc::new(JsonUserStore::new(cfg.user_store_path.clone())),
    };

    rdb_telegram::router::run_polling(cfg, services)
        .await
        .map_err(|e| rdb_core::Error::Collaborator(format!("telegram bot failed: {e}")))?;

    Ok(())
}
