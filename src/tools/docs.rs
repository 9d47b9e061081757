// src/tools/docs.rs
// Documentation tools: Algolia-backed search plus page fetch.
//
// These are the only tools available in unauthenticated mode.

use crate::error::{Result, ServerError};
use crate::mcp::ServerState;
use crate::tools::{ToolCallFrame, ToolOutput};
use crate::utils::truncate;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Algolia application serving the documentation index.
const ALGOLIA_APP_ID: &str = "UVGNP3AZHC";
/// Public search-only API key.
const ALGOLIA_API_KEY: &str = "299bb2b0c26e6a1f051eca8d9a9b66e2";
const ALGOLIA_INDEX: &str = "apify_docs";

/// Hosts a docs fetch is allowed to touch.
const ALLOWED_DOC_HOSTS: [&str; 2] = ["docs.apify.com", "apify.com"];

/// Cap on fetched page content returned to the client.
const DOC_PAGE_MAX_CHARS: usize = 50_000;

/// Bounded cache for search results and fetched pages.
const CACHE_CAPACITY: u64 = 500;
const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DocsSearchRequest {
    #[schemars(description = "Full-text query against the Apify documentation")]
    pub query: String,
    #[schemars(description = "Maximum number of results (default 5, max 20)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DocsFetchRequest {
    #[schemars(description = "URL of the documentation page to fetch")]
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct AlgoliaResponse {
    #[serde(default)]
    hits: Vec<Value>,
}

/// Documentation search service. Search clients are pooled per Algolia app
/// id; with a single index that is one shared HTTP client.
#[derive(Clone)]
pub struct DocsSearch {
    http: reqwest::Client,
    cache: moka::future::Cache<String, Arc<Value>>,
}

impl DocsSearch {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            cache: moka::future::Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// Query the docs index, serving repeated queries from the cache.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Arc<Value>> {
        let cache_key = format!("search:{limit}:{query}");
        if let Some(hit) = self.cache.get(&cache_key).await {
            return Ok(hit);
        }

        let url = format!(
            "https://{}-dsn.algolia.net/1/indexes/{}/query",
            ALGOLIA_APP_ID.to_lowercase(),
            ALGOLIA_INDEX
        );
        let response = self
            .http
            .post(&url)
            .timeout(crate::http::FAST_TIMEOUT)
            .header("X-Algolia-Application-Id", ALGOLIA_APP_ID)
            .header("X-Algolia-API-Key", ALGOLIA_API_KEY)
            .json(&json!({ "query": query, "hitsPerPage": limit }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::Api {
                status: status.as_u16(),
                message: format!("documentation search failed: {}", response.text().await?),
            });
        }

        let parsed: AlgoliaResponse = response.json().await?;
        let hits: Vec<Value> = parsed
            .hits
            .into_iter()
            .map(|hit| {
                json!({
                    "title": hit.pointer("/hierarchy/lvl1").or_else(|| hit.get("title")).cloned(),
                    "url": hit.get("url").cloned(),
                    "content": hit.get("content").and_then(Value::as_str).map(|c| truncate(c, 500)),
                })
            })
            .collect();

        let result = Arc::new(Value::Array(hits));
        self.cache.insert(cache_key, result.clone()).await;
        Ok(result)
    }

    /// Fetch a documentation page, restricted to known hosts.
    pub async fn fetch_page(&self, raw_url: &str) -> Result<Arc<Value>> {
        let parsed = url::Url::parse(raw_url)
            .map_err(|e| ServerError::InvalidInput(format!("invalid URL {raw_url:?}: {e}")))?;
        let host = parsed.host_str().unwrap_or_default();
        if !ALLOWED_DOC_HOSTS.iter().any(|allowed| host == *allowed) {
            return Err(ServerError::InvalidInput(format!(
                "only Apify documentation pages can be fetched, got host {host:?}"
            )));
        }

        let cache_key = format!("page:{raw_url}");
        if let Some(hit) = self.cache.get(&cache_key).await {
            return Ok(hit);
        }

        let response = self
            .http
            .get(parsed)
            .timeout(crate::http::FAST_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::Api {
                status: status.as_u16(),
                message: format!("fetching {raw_url} failed"),
            });
        }
        let body = response.text().await?;
        let result = Arc::new(json!({
            "url": raw_url,
            "content": truncate(&body, DOC_PAGE_MAX_CHARS),
        }));
        self.cache.insert(cache_key, result.clone()).await;
        Ok(result)
    }
}

/// `search-apify-docs` handler.
pub async fn search_apify_docs(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: DocsSearchRequest =
        serde_json::from_value(Value::Object(frame.args.clone()))
            .map_err(|e| ServerError::InvalidInput(e.to_string()))?;
    let limit = request.limit.unwrap_or(5).min(20);

    let hits = state.docs.search(&request.query, limit).await?;
    let text = serde_json::to_string_pretty(hits.as_ref())?;
    Ok(ToolOutput::structured(text, json!({ "results": hits.as_ref() })))
}

/// `fetch-apify-docs` handler.
pub async fn fetch_apify_docs(state: &ServerState, frame: &ToolCallFrame) -> Result<ToolOutput> {
    let request: DocsFetchRequest = serde_json::from_value(Value::Object(frame.args.clone()))
        .map_err(|e| ServerError::InvalidInput(e.to_string()))?;

    let page = state.docs.fetch_page(&request.url).await?;
    let text = page
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(ToolOutput::structured(text, page.as_ref().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_page_rejects_foreign_hosts() {
        let docs = DocsSearch::new(reqwest::Client::new());
        let err = docs.fetch_page("https://evil.example.com/docs").await;
        assert!(matches!(err, Err(ServerError::InvalidInput(_))));

        let err = docs.fetch_page("not a url").await;
        assert!(matches!(err, Err(ServerError::InvalidInput(_))));
    }
}
