//! Raindrop.io adapter (bookmarks).
//!
//! Implements [`BookmarkService`] on top of the Raindrop REST API: bookmarks
//! are created with `POST /v1/raindrop`, files attached with
//! `PUT /v1/raindrop/{id}/file` and looked up with `GET /v1/raindrops/{collection}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rdb_core::{
    domain::{BookmarkAccount, BookmarkRef},
    errors::Error,
    ports::{Bookmark, BookmarkQuery, BookmarkService, FileUpload, NewBookmark},
    Result,
};

/// Request duration is bounded by the caller, which knows whether a file is
/// being moved.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    link: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    please_parse: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    excerpt: Option<&'a str>,
}

impl<'a> CreateRequest<'a> {
    fn from_bookmark(b: &'a NewBookmark) -> Self {
        if b.parse_metadata {
            return Self {
                link: &b.url,
                please_parse: Some(serde_json::json!({})),
                title: None,
                excerpt: None,
            };
        }
        Self {
            link: &b.url,
            please_parse: None,
            title: b.title.as_deref(),
            excerpt: b.description.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    #[serde(default)]
    result: bool,
    item: Option<Item>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "_id")]
    id: i64,
}

/// Pseudo collection spanning every collection except trash.
const ALL_COLLECTIONS: i64 = 0;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    items: Vec<ListedItem>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedItem {
    #[serde(rename = "_id")]
    id: i64,
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    excerpt: String,
    #[serde(default)]
    cover: Option<String>,
}

impl From<ListedItem> for Bookmark {
    fn from(item: ListedItem) -> Self {
        Bookmark {
            id: BookmarkRef(item.id),
            link: item.link,
            title: item.title,
            excerpt: item.excerpt,
            cover: item.cover,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RaindropClient {
    base_url: String,
    http: reqwest::Client,
}

impl RaindropClient {
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Collaborator(format!("raindrop client build error: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_item(resp: reqwest::Response, what: &str) -> Result<ItemResponse> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Collaborator(format!(
                "raindrop {what} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ItemResponse = resp
            .json()
            .await
            .map_err(|e| Error::Collaborator(format!("raindrop json error: {e}")))?;

        if !parsed.result {
            return Err(Error::Collaborator(format!(
                "raindrop {what} was not accepted: {}",
                parsed.error_message.as_deref().unwrap_or("no reason given")
            )));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl BookmarkService for RaindropClient {
    async fn create_bookmark(
        &self,
        account: &BookmarkAccount,
        bookmark: NewBookmark,
    ) -> Result<BookmarkRef> {
        let resp = self
            .http
            .post(self.url("/v1/raindrop"))
            .bearer_auth(&account.api_token)
            .json(&CreateRequest::from_bookmark(&bookmark))
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("raindrop request error: {e}")))?;

        let parsed = Self::read_item(resp, "create").await?;
        let item = parsed
            .item
            .ok_or_else(|| Error::Collaborator("raindrop create returned no item".to_string()))?;

        tracing::debug!(raindrop_id = item.id, "raindrop created");
        Ok(BookmarkRef(item.id))
    }

    async fn upload_file(
        &self,
        account: &BookmarkAccount,
        bookmark: BookmarkRef,
        file: FileUpload,
    ) -> Result<()> {
        let size = file.bytes.len();
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.mime)
            .map_err(|e| Error::Collaborator(format!("raindrop multipart error: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .put(self.url(&format!("/v1/raindrop/{}/file", bookmark.0)))
            .bearer_auth(&account.api_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("raindrop request error: {e}")))?;

        Self::read_item(resp, "file upload").await?;
        tracing::debug!(raindrop_id = bookmark.0, bytes = size, "raindrop file uploaded");
        Ok(())
    }

    async fn search(
        &self,
        account: &BookmarkAccount,
        query: BookmarkQuery,
    ) -> Result<Vec<Bookmark>> {
        let mut params = vec![
            ("sort", query.sort.as_str().to_string()),
            ("page", query.page.to_string()),
            ("perpage", query.per_page.to_string()),
        ];
        if let Some(search) = query.search {
            params.push(("search", search));
        }

        let resp = self
            .http
            .get(self.url(&format!("/v1/raindrops/{ALL_COLLECTIONS}")))
            .bearer_auth(&account.api_token)
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("raindrop request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Collaborator(format!(
                "raindrop search failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ListResponse = resp
            .json()
            .await
            .map_err(|e| Error::Collaborator(format!("raindrop json error: {e}")))?;
        if !parsed.result {
            return Err(Error::Collaborator(format!(
                "raindrop search was not accepted: {}",
                parsed.error_message.as_deref().unwrap_or("no reason given")
            )));
        }

        Ok(parsed.items.into_iter().map(Bookmark::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use rdb_core::ports::SortOrder;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn account() -> BookmarkAccount {
        BookmarkAccount {
            api_token: "test_token".into(),
        }
    }

    #[tokio::test]
    async fn create_with_parsing_sends_please_parse() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/raindrop"))
            .and(header("Authorization", "Bearer test_token"))
            .and(body_json(json!({"link": "https://x.test/a", "pleaseParse": {}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": true, "item": {"_id": 42, "link": "https://x.test/a"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = RaindropClient::with_base_url(server.uri()).unwrap();
        let created = client
            .create_bookmark(&account(), NewBookmark::parsed("https://x.test/a"))
            .await
            .unwrap();

        assert_eq!(created, BookmarkRef(42));
    }

    #[tokio::test]
    async fn create_without_parsing_sends_title_and_excerpt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/raindrop"))
            .and(body_json(json!({
                "link": "https://paste.test/html/1",
                "title": "Title",
                "excerpt": "Excerpt"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": true, "item": {"_id": 7}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = RaindropClient::with_base_url(server.uri()).unwrap();
        let bookmark =
            NewBookmark::titled("https://paste.test/html/1", "Title").with_description("Excerpt");
        let created = client.create_bookmark(&account(), bookmark).await.unwrap();

        assert_eq!(created, BookmarkRef(7));
    }

    #[tokio::test]
    async fn unaccepted_create_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/raindrop"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": false, "errorMessage": "bad link"})),
            )
            .mount(&server)
            .await;

        let client = RaindropClient::with_base_url(server.uri()).unwrap();
        let err = client
            .create_bookmark(&account(), NewBookmark::parsed("nope"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("bad link"));
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/raindrop"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let client = RaindropClient::with_base_url(server.uri()).unwrap();
        let err = client
            .create_bookmark(&account(), NewBookmark::parsed("https://x.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Collaborator(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn upload_file_puts_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/raindrop/42/file"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": true, "item": {"_id": 42}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = RaindropClient::with_base_url(format!("{}/", server.uri())).unwrap();
        client
            .upload_file(
                &account(),
                BookmarkRef(42),
                FileUpload {
                    bytes: b"%PDF-1.4".to_vec(),
                    name: "paper.pdf".into(),
                    mime: "application/pdf".into(),
                },
            )
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains(r#"name="file"; filename="paper.pdf""#));
        assert!(body.contains("%PDF-1.4"));
    }

    #[tokio::test]
    async fn search_queries_all_collections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/raindrops/0"))
            .and(header("Authorization", "Bearer test_token"))
            .and(query_param("search", "rust"))
            .and(query_param("sort", "-sort"))
            .and(query_param("perpage", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": true,
                "items": [
                    {"_id": 1, "link": "https://a.test", "title": "A", "excerpt": "first", "cover": "https://a.test/c.png"},
                    {"_id": 2, "link": "https://b.test"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RaindropClient::with_base_url(server.uri()).unwrap();
        let query = BookmarkQuery {
            search: Some("rust".into()),
            sort: SortOrder::Manual,
            page: 0,
            per_page: 50,
        };
        let found = client.search(&account(), query).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, BookmarkRef(1));
        assert_eq!(found[0].cover.as_deref(), Some("https://a.test/c.png"));
        assert_eq!(found[1].title, "");
        assert_eq!(found[1].excerpt, "");
    }

    #[tokio::test]
    async fn listing_without_text_omits_search_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/raindrops/0"))
            .and(query_param("sort", "created"))
            .and(query_param_is_missing("search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": true, "items": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = RaindropClient::with_base_url(server.uri()).unwrap();
        let query = BookmarkQuery {
            sort: SortOrder::CreatedAsc,
            per_page: 50,
            ..Default::default()
        };

        assert!(client.search(&account(), query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_search_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/raindrops/0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": false, "errorMessage": "bad token"})),
            )
            .mount(&server)
            .await;

        let client = RaindropClient::with_base_url(server.uri()).unwrap();
        let err = client
            .search(&account(), BookmarkQuery::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("bad token"));
    }
}
