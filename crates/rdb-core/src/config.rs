use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{aggregator::DEFAULT_DEBOUNCE, classifier::TransportPath, errors::Error, Result};

pub const DEFAULT_RAINDROP_API_URL: &str = "https://api.raindrop.io/rest";
pub const DEFAULT_HTMLSHARE_BASE_URL: &str = "https://raindrop-html-share.sinja.io";
pub const DEFAULT_IMAGE_HOST_URL: &str = "https://telegra.ph";
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(15);
/// Attachment downloads and file uploads; sized for 100 MB on a slow link.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

/// Typed configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// Self-hosted Bot API server, if any.
    pub telegram_api_url: Option<String>,
    pub admin_telegram_id: Option<i64>,

    // Storage
    pub user_store_path: PathBuf,
    pub usage_log_path: PathBuf,

    // Collaborators
    pub raindrop_api_url: String,
    pub htmlshare_base_url: String,
    pub htmlshare_password: String,
    pub image_host_url: String,

    // Timing
    pub forward_debounce: Duration,
    pub collaborator_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build the config from any key lookup; `load` uses the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("BOT_TOKEN"))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let telegram_api_url = get("TELEGRAM_API_URL");

        let admin_telegram_id = match get("ADMIN_TELEGRAM_ID") {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("ADMIN_TELEGRAM_ID is not a numeric id: {raw}"))
            })?),
            None => None,
        };

        let user_store_path =
            PathBuf::from(get("USER_STORE_PATH").unwrap_or_else(|| "users.json".to_string()));
        let usage_log_path = PathBuf::from(
            get("USAGE_LOG_PATH").unwrap_or_else(|| "/tmp/raindrop-bot-usage.log".to_string()),
        );

        let raindrop_api_url = trim_url(
            get("RAINDROP_API_URL").unwrap_or_else(|| DEFAULT_RAINDROP_API_URL.to_string()),
        );
        let htmlshare_base_url = trim_url(
            get("HTMLSHARE_BASE_URL").unwrap_or_else(|| DEFAULT_HTMLSHARE_BASE_URL.to_string()),
        );
        let htmlshare_password = lookup("HTMLSHARE_PASSWORD").unwrap_or_default();
        let image_host_url =
            trim_url(get("IMAGE_HOST_URL").unwrap_or_else(|| DEFAULT_IMAGE_HOST_URL.to_string()));

        let forward_debounce = get("FORWARD_DEBOUNCE_MS")
            .and_then(parse_u64)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);
        let collaborator_timeout = get("COLLABORATOR_TIMEOUT_MS")
            .and_then(parse_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT);
        let transfer_timeout = get("TRANSFER_TIMEOUT_MS")
            .and_then(parse_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TRANSFER_TIMEOUT);

        Ok(Self {
            telegram_bot_token,
            telegram_api_url,
            admin_telegram_id,
            user_store_path,
            usage_log_path,
            raindrop_api_url,
            htmlshare_base_url,
            htmlshare_password,
            image_host_url,
            forward_debounce,
            collaborator_timeout,
            transfer_timeout,
        })
    }

    /// Attachment transport implied by the Bot API endpoint.
    pub fn transport_path(&self) -> TransportPath {
        if self.telegram_api_url.is_some() {
            TransportPath::LocalBotApi
        } else {
            TransportPath::BotApi
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_u64(s: String) -> Option<u64> {
    s.trim().parse::<u64>().ok()
}

fn trim_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
