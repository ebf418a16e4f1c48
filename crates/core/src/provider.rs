use crate::config::{ProviderKind, Settings};
use crate::domain::analysis::AnalysisPayload;
use crate::domain::contract::ProviderAnalysis;
use crate::error::{bounded, MAX_MESSAGE_CHARS};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/analysis";

/// Source of raw analyses. Implementations validate their own output; the
/// engine never fills in missing criteria.
#[async_trait::async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_analysis(&self, symbol: &str) -> Result<AnalysisPayload>;
}

pub fn from_settings(settings: &Settings) -> Result<Arc<dyn AnalysisProvider>> {
    let provider: Arc<dyn AnalysisProvider> = match settings.provider {
        ProviderKind::Anthropic => Arc::new(
            crate::llm::anthropic::AnthropicAnalysisProvider::from_settings(settings)?,
        ),
        ProviderKind::HttpJson => Arc::new(HttpJsonAnalysisProvider::from_settings(settings)?),
    };
    Ok(provider)
}

/// Plain HTTP endpoint returning the analysis JSON directly.
#[derive(Debug, Clone)]
pub struct HttpJsonAnalysisProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
}

impl HttpJsonAnalysisProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();
        let api_key = settings.data_provider_api_key.clone();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let path = std::env::var("DATA_PROVIDER_ANALYSIS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for HttpJsonAnalysisProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_analysis(&self, symbol: &str) -> Result<AnalysisPayload> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .context("data provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;

        if !status.is_success() {
            anyhow::bail!(
                "data provider HTTP {status}: {}",
                bounded(&text, MAX_MESSAGE_CHARS)
            );
        }

        parse_provider_body(&text)
    }
}

fn parse_provider_body(text: &str) -> Result<AnalysisPayload> {
    let parsed = serde_json::from_str::<ProviderAnalysis>(text)
        .with_context(|| {
            format!(
                "provider response is not a valid analysis: {}",
                bounded(text, MAX_MESSAGE_CHARS)
            )
        })?;
    parsed.validate_and_into_payload()
}
