use crate::config::Settings;
use crate::ingest::error::{IngestError, IngestResult};
use anyhow::Context;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where raw response bodies come from. The scheduler only ever talks to this trait.
#[async_trait::async_trait]
pub trait SheetSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// One GET of the query endpoint. No retries: the refresh timer is the retry policy.
    async fn fetch(&self) -> IngestResult<String>;
}

#[derive(Debug, Clone)]
pub struct HttpSheetSource {
    http: reqwest::Client,
    url: String,
}

impl HttpSheetSource {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let timeout_secs = std::env::var("SHEET_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(settings.sheet_url(), Duration::from_secs(timeout_secs))
    }

    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build sheet http client")?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl SheetSource for HttpSheetSource {
    fn source_name(&self) -> &'static str {
        "sheet_query_http"
    }

    async fn fetch(&self) -> IngestResult<String> {
        let res = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| IngestError::Transport(format!("sheet request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            return Err(IngestError::Transport(format!("sheet endpoint HTTP {status}")));
        }

        let text = res
            .text()
            .await
            .map_err(|e| IngestError::Transport(format!("failed to read sheet response: {e}")))?;

        tracing::debug!(bytes = text.len(), %status, "fetched sheet response");
        Ok(text)
    }
}
