//! Notion database client.
//!
//! Implements [`RecordStore`] against the Notion REST API:
//!
//! - `POST /v1/databases/{id}/query` pages through every record, reading the
//!   configured URL property to build the known-URL set;
//! - `POST /v1/pages` creates one record per published item.
//!
//! Every request carries `Authorization: Bearer <token>` and the pinned
//! `Notion-Version` header from configuration.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NotionConfig;
use crate::error::{Result, ScanError};
use crate::models::KnownUrlSet;
use crate::traits::RecordStore;

pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    database_id: String,
    api_version: String,
    page_size: u32,
    url_property: String,
}

impl NotionClient {
    pub fn new(config: &NotionConfig, token: String, database_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            database_id,
            api_version: config.api_version.clone(),
            page_size: config.page_size,
            url_property: config.properties.link.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version)
    }

    async fn query_page(&self, cursor: Option<&str>) -> Result<QueryResponse> {
        let mut body = Map::new();
        body.insert("page_size".into(), json!(self.page_size));
        if let Some(cursor) = cursor {
            body.insert("start_cursor".into(), json!(cursor));
        }

        let response = self
            .post(&format!("/v1/databases/{}/query", self.database_id))
            .json(&body)
            .send()
            .await
            .map_err(|e| ScanError::DedupFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ScanError::DedupFetch(format!(
                "{}: {}",
                status,
                api_error_message(&text)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ScanError::DedupFetch(format!("unreadable query page: {}", e)))
    }
}

#[async_trait]
impl RecordStore for NotionClient {
    async fn known_urls(&self) -> Result<KnownUrlSet> {
        let mut urls = KnownUrlSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.query_page(cursor.as_deref()).await?;
            pages += 1;

            for record in &page.results {
                if let Some(url) = record.url_value(&self.url_property) {
                    urls.insert(url.to_string());
                }
            }

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!(cursor = %next, "query page repeated its cursor; stopping");
                    break;
                }
                (true, Some(next)) => cursor = Some(next),
                (true, None) => {
                    warn!("query page reported has_more without a cursor; stopping");
                    break;
                }
                (false, _) => break,
            }
        }

        debug!(pages, "read database pages");
        Ok(urls)
    }

    async fn create_record(&self, properties: Value) -> Result<()> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": properties,
        });

        let response = self.post("/v1/pages").json(&body).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(ScanError::Publish {
            status: status.as_u16(),
            message: api_error_message(&text),
        })
    }
}

/// Read every stored record's URL, once per run.
pub async fn fetch_known_urls(store: &dyn RecordStore) -> Result<KnownUrlSet> {
    let urls = store.known_urls().await?;
    info!(known = urls.len(), "existing records loaded");
    Ok(urls)
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<PageRecord>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageRecord {
    #[serde(default)]
    properties: Map<String, Value>,
}

impl PageRecord {
    fn url_value(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)?
            .get("url")?
            .as_str()
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// The API's `message (code)` when the body is a Notion error object,
/// otherwise the raw body.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(ApiError {
            message: Some(message),
            code,
        }) => match code {
            Some(code) => format!("{} ({})", message, code),
            None => message,
        },
        _ => body.trim().to_string(),
    }
}
