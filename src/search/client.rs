use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::format::{decode_matches, RawMatch};
use crate::config::ShodanConfig;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The provider answered with an error of its own.
    #[error("{0}")]
    Api(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unreadable response: {0}")]
    Decode(String),
}

/// External host-intelligence provider.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Full host record for one address, `None` when the provider has nothing.
    async fn host(&self, ip: &str) -> Result<Option<Value>, SearchError>;
    /// Matches for a `name:value ...` filter query.
    async fn search(&self, query: &str) -> Result<Vec<RawMatch>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Shodan REST client.
pub struct ShodanClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ShodanClient {
    pub fn new(cfg: &ShodanConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self::with_client(cfg, http))
    }

    pub fn with_client(cfg: &ShodanConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        }
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<reqwest::Response, SearchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;
        debug!(path, status = %resp.status(), "shodan response");
        Ok(resp)
    }
}

/// Pulls the provider's own message out of an error response.
async fn api_error(resp: reqwest::Response) -> SearchError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(e) => SearchError::Api(e.error),
        Err(_) if body.trim().is_empty() => SearchError::Api(format!("provider returned {status}")),
        Err(_) => SearchError::Api(body.trim().to_string()),
    }
}

#[async_trait]
impl SearchProvider for ShodanClient {
    async fn host(&self, ip: &str) -> Result<Option<Value>, SearchError> {
        let resp = self.get(&format!("/shodan/host/{ip}"), &[]).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let record = resp
            .json::<Value>()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(Some(record))
    }

    async fn search(&self, query: &str) -> Result<Vec<RawMatch>, SearchError> {
        let resp = self.get("/shodan/host/search", &[("query", query)]).await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let body = resp
            .json::<SearchResponse>()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(decode_matches(body.matches))
    }
}
