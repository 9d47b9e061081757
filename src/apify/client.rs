// src/apify/client.rs
// REST client for the Apify platform API (v2)

use super::types::*;
use crate::error::{Result, ServerError};
use crate::http::WAIT_FOR_FINISH_SECS;
use serde_json::Value;
use tracing::debug;

/// Base URL of the Apify API.
pub const APIFY_API_BASE_URL: &str = "https://api.apify.com";

/// Client for the Apify REST API. Cheap to clone; all clones share the
/// underlying connection pool.
#[derive(Clone)]
pub struct ApifyClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApifyClient {
    pub fn new(http: reqwest::Client, token: Option<String>) -> Self {
        Self {
            http,
            base_url: APIFY_API_BASE_URL.to_string(),
            token,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Path segment for an Actor reference: `owner/name` becomes `owner~name`,
    /// plain ids pass through. Either form is URL-encoded.
    fn actor_path(owner_or_id: &str) -> String {
        let tilde = owner_or_id.replace('/', "~");
        urlencoding::encode(&tilde).into_owned()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send a request and decode the `{ "data": ... }` envelope, mapping
    /// non-2xx responses to `ServerError::Api`.
    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(ServerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let envelope: DataEnvelope<T> = response.json().await?;
        Ok(envelope.data)
    }

    /// Extract the error message from an Apify error body, falling back to
    /// the raw text.
    async fn error_message(response: reqwest::Response) -> String {
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .unwrap_or(text)
    }

    // ── Actors ───────────────────────────────────────────────────────────

    /// Fetch an Actor by `owner/name` or id.
    pub async fn get_actor(&self, owner_or_id: &str) -> Result<Actor> {
        let path = format!("/v2/acts/{}", Self::actor_path(owner_or_id));
        self.send(self.request(reqwest::Method::GET, &path)).await
    }

    /// Fetch the Actor's default build (input schema + storage views).
    pub async fn get_default_build(&self, owner_or_id: &str) -> Result<Build> {
        let path = format!("/v2/acts/{}/builds/default", Self::actor_path(owner_or_id));
        self.send(self.request(reqwest::Method::GET, &path)).await
    }

    /// Search the Apify Store.
    pub async fn search_store(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
        category: Option<&str>,
    ) -> Result<Vec<StoreActor>> {
        let mut req = self.request(reqwest::Method::GET, "/v2/store").query(&[
            ("search", query),
            ("limit", &limit.to_string()),
            ("offset", &offset.to_string()),
        ]);
        if let Some(category) = category {
            req = req.query(&[("category", category)]);
        }
        let page: ListEnvelope<StoreActor> = self.send(req).await?;
        Ok(page.items)
    }

    // ── Runs ─────────────────────────────────────────────────────────────

    /// Start an Actor run. Memory is assumed pre-clamped by the caller.
    pub async fn start_run(
        &self,
        owner_or_id: &str,
        input: &Value,
        memory_mbytes: Option<u32>,
        timeout_secs: Option<u32>,
    ) -> Result<Run> {
        self.require_token("starting an Actor run")?;
        let path = format!("/v2/acts/{}/runs", Self::actor_path(owner_or_id));
        let mut req = self.request(reqwest::Method::POST, &path).json(input);
        if let Some(memory) = memory_mbytes {
            req = req.query(&[("memory", memory.to_string())]);
        }
        if let Some(timeout) = timeout_secs {
            req = req.query(&[("timeout", timeout.to_string())]);
        }
        let run: Run = self.send(req).await?;
        debug!(run_id = %run.id, actor = owner_or_id, "Actor run started");
        Ok(run)
    }

    /// Fetch a run by id.
    pub async fn get_run(&self, run_id: &str) -> Result<Run> {
        let path = format!("/v2/actor-runs/{}", urlencoding::encode(run_id));
        self.send(self.request(reqwest::Method::GET, &path)).await
    }

    /// Block until the run reaches a terminal status. The API holds each
    /// request open for up to `waitForFinish` seconds, so this loops without
    /// a client-side sleep.
    pub async fn wait_for_finish(&self, run_id: &str) -> Result<Run> {
        loop {
            let path = format!(
                "/v2/actor-runs/{}?waitForFinish={}",
                urlencoding::encode(run_id),
                WAIT_FOR_FINISH_SECS
            );
            let run: Run = self.send(self.request(reqwest::Method::GET, &path)).await?;
            if run.status.is_terminal() {
                return Ok(run);
            }
        }
    }

    /// Abort a run. `gracefully=false` kills it immediately.
    pub async fn abort_run(&self, run_id: &str, gracefully: bool) -> Result<Run> {
        let path = format!(
            "/v2/actor-runs/{}/abort?gracefully={}",
            urlencoding::encode(run_id),
            gracefully
        );
        self.send(self.request(reqwest::Method::POST, &path)).await
    }

    /// Fetch the tail of a run log as plain text.
    pub async fn get_run_log(&self, run_id: &str) -> Result<String> {
        let path = format!(
            "/v2/actor-runs/{}/log?stream=false",
            urlencoding::encode(run_id)
        );
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(ServerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.text().await?)
    }

    /// List the account's recent runs, newest first.
    pub async fn list_runs(&self, offset: u32, limit: u32) -> Result<Vec<Run>> {
        self.require_token("listing runs")?;
        let req = self.request(reqwest::Method::GET, "/v2/actor-runs").query(&[
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("desc", "true".to_string()),
        ]);
        let page: ListEnvelope<Run> = self.send(req).await?;
        Ok(page.items)
    }

    // ── Storage ──────────────────────────────────────────────────────────

    /// Fetch one page of dataset items (cleaned of hidden fields).
    pub async fn dataset_items(
        &self,
        dataset_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>> {
        let path = format!("/v2/datasets/{}/items", urlencoding::encode(dataset_id));
        let req = self.request(reqwest::Method::GET, &path).query(&[
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("clean", "true".to_string()),
        ]);
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(ServerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        // Items endpoint returns a bare JSON array, no data envelope.
        Ok(response.json().await?)
    }

    /// Fetch a key-value store record. JSON records come back as values,
    /// anything else as a string.
    pub async fn key_value_record(&self, store_id: &str, key: &str) -> Result<Value> {
        let path = format!(
            "/v2/key-value-stores/{}/records/{}",
            urlencoding::encode(store_id),
            urlencoding::encode(key)
        );
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(ServerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    fn require_token(&self, operation: &str) -> Result<()> {
        if self.token.is_none() {
            return Err(ServerError::Unauthorized(format!(
                "{operation} requires an APIFY_TOKEN"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_path_encoding() {
        assert_eq!(
            ApifyClient::actor_path("apify/rag-web-browser"),
            "apify~rag-web-browser"
        );
        assert_eq!(ApifyClient::actor_path("nwua9Gu5YrADL7ZDj"), "nwua9Gu5YrADL7ZDj");
    }

    #[test]
    fn test_require_token() {
        let client = ApifyClient::new(reqwest::Client::new(), None);
        assert!(client.require_token("x").is_err());

        let client = ApifyClient::new(reqwest::Client::new(), Some("t".into()));
        assert!(client.require_token("x").is_ok());
    }
}
