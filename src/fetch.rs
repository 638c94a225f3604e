use std::time::Instant;

use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{info, warn};

const USER_AGENT: &str = concat!("scripture_extract/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid upstream url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP client for the upstream passage pages.
///
/// One `reqwest::Client` is shared for the whole process so connections are
/// reused. Requests carry no timeout and are not retried.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(GatewayClient {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn passage_url(&self, query: &str, version: &str) -> Result<Url, FetchError> {
        let endpoint = format!("{}/passage/", self.base_url.trim_end_matches('/'));
        Url::parse_with_params(&endpoint, &[("search", query), ("version", version)]).map_err(
            |e| FetchError::InvalidUrl {
                url: endpoint.clone(),
                reason: e.to_string(),
            },
        )
    }

    /// Retrieve the raw passage page for `query` in `version`.
    ///
    /// Non-success statuses are logged and their body is still returned;
    /// extraction turns an unexpected page into an empty result.
    pub async fn fetch_passage(&self, query: &str, version: &str) -> Result<String, FetchError> {
        let url = self.passage_url(query, version)?;

        let start = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if status.is_success() {
            info!(%url, status = status.as_u16(), latency_ms, bytes = body.len(), "fetched passage page");
        } else {
            warn!(%url, status = status.as_u16(), latency_ms, "upstream returned non-success status");
        }
        Ok(body)
    }
}
