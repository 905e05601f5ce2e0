//! Client for the HTML share service.
//!
//! `POST {base}/html` with `{"html", "password"}` answers `{"id"}`; the page is
//! then served at `{base}/html/{id}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rdb_core::{errors::Error, ports::PasteService, Result};

use crate::{error_for_status, http_client};

#[derive(Serialize)]
struct UploadRequest<'a> {
    html: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct HtmlShareClient {
    base_url: String,
    password: String,
    http: reqwest::Client,
}

impl HtmlShareClient {
    pub fn new(base_url: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            password: password.into(),
            http: http_client("htmlshare")?,
        })
    }

    pub fn page_url(&self, id: &str) -> String {
        format!("{}/html/{id}", self.base_url)
    }
}

#[async_trait]
impl PasteService for HtmlShareClient {
    async fn upload_html(&self, html: &str) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/html", self.base_url))
            .json(&UploadRequest {
                html,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("htmlshare request error: {e}")))?;

        let parsed: UploadResponse = error_for_status(resp, "htmlshare")
            .await?
            .json()
            .await
            .map_err(|e| Error::Collaborator(format!("htmlshare json error: {e}")))?;

        // The service has answered with both string and numeric ids.
        let id = match parsed.id {
            serde_json::Value::String(s) if !s.trim().is_empty() => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(Error::Collaborator(format!(
                    "htmlshare returned an unusable id: {other}"
                )))
            }
        };

        let url = self.page_url(&id);
        tracing::debug!(%url, bytes = html.len(), "html page published");
        Ok(url)
    }
}
