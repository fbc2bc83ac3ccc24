//! HTTP implementation of [`ExternalFetch`].

use crate::store::ExternalFetch;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("notebridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ExternalFetch for HttpFetch {
    async fn get(&self, url: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("GET {} returned HTTP {}: {}", url, status, body);
        }

        resp.json::<serde_json::Value>()
            .await
            .with_context(|| format!("GET {}: response is not JSON", url))
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<String> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("POST {} returned HTTP {}: {}", url, status, text);
        }
        Ok(text)
    }
}
