//! Publishing adapters: the HTML share service for composed posts and the
//! image host for pictures embedded in them.

pub mod htmlshare;
pub mod telegraph;

pub use htmlshare::HtmlShareClient;
pub use telegraph::TelegraphClient;

use std::time::Duration;

use rdb_core::{errors::Error, Result};

/// Only the connection is bounded here; the caller bounds each request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client(service: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Collaborator(format!("{service} client build error: {e}")))
}

async fn error_for_status(resp: reqwest::Response, service: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Collaborator(format!(
        "{service} request failed: {status} {}",
        body.chars().take(200).collect::<String>()
    )))
}
