//! Client for a telegra.ph style image host.
//!
//! Images are posted as multipart `file` to `{base}/upload`; the answer is a
//! list of `{"src": "/file/..."}` paths relative to the host, or
//! `{"error": "..."}`.

use async_trait::async_trait;
use serde::Deserialize;

use rdb_core::{
    classifier::EMBEDDABLE_IMAGE_MIME,
    errors::Error,
    ports::{FileUpload, ImageHost},
    Result,
};

use crate::{error_for_status, http_client};

#[derive(Deserialize)]
#[serde(untagged)]
enum UploadResponse {
    Files(Vec<UploadedFile>),
    Error { error: String },
}

#[derive(Deserialize)]
struct UploadedFile {
    src: String,
}

#[derive(Clone, Debug)]
pub struct TelegraphClient {
    base_url: String,
    http: reqwest::Client,
}

impl TelegraphClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: http_client("image host")?,
        })
    }

    fn absolute(&self, src: &str) -> String {
        if src.starts_with("http://") || src.starts_with("https://") {
            return src.to_string();
        }
        format!("{}/{}", self.base_url, src.trim_start_matches('/'))
    }
}

#[async_trait]
impl ImageHost for TelegraphClient {
    async fn upload_image(&self, image: FileUpload) -> Result<Vec<String>> {
        if !EMBEDDABLE_IMAGE_MIME.contains(&image.mime.as_str()) {
            return Err(Error::InvalidInput(format!(
                "image host does not accept {}",
                image.mime
            )));
        }

        let part = reqwest::multipart::Part::bytes(image.bytes)
            .file_name(image.name)
            .mime_str(&image.mime)
            .map_err(|e| Error::Collaborator(format!("image host multipart error: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("image host request error: {e}")))?;

        let parsed: UploadResponse = error_for_status(resp, "image host")
            .await?
            .json()
            .await
            .map_err(|e| Error::Collaborator(format!("image host json error: {e}")))?;

        match parsed {
            UploadResponse::Files(files) if !files.is_empty() => {
                Ok(files.iter().map(|f| self.absolute(&f.src)).collect())
            }
            UploadResponse::Files(_) => Err(Error::Collaborator(
                "image host returned no files".to_string(),
            )),
            UploadResponse::Error { error } => {
                Err(Error::Collaborator(format!("image host rejected upload: {error}")))
            }
        }
    }
}
