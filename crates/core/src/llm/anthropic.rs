use crate::config::Settings;
use crate::domain::analysis::{AnalysisPayload, CriterionKey};
use crate::domain::contract::ProviderAnalysis;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::LlmVendor;
use crate::provider::AnalysisProvider;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TOOL_NAME_EMIT_ANALYSIS: &str = "emit_analysis";

#[derive(Debug, Clone)]
pub struct AnthropicAnalysisProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicAnalysisProvider {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<CreateMessageResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            tracing::warn!(%status, raw = %text, "Anthropic returned an error response");
            return Err(Self::http_error(status, &text).into());
        }

        serde_json::from_str::<CreateMessageResponse>(&text).map_err(|e| {
            tracing::warn!(raw = %text, error = %e, "undecodable Anthropic response");
            anyhow::Error::from(
                LlmDiagnosticsError::new(LlmVendor::Anthropic, "decode", e.to_string())
                    .with_raw(&text),
            )
        })
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> LlmDiagnosticsError {
        // Prefer the vendor's own error message over the raw envelope.
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string));
        LlmDiagnosticsError::new(LlmVendor::Anthropic, "http", format!("status={status}"))
            .with_raw(message.as_deref().unwrap_or(body))
    }

    fn tools() -> Vec<Tool> {
        let mut criteria = serde_json::Map::new();
        for key in CriterionKey::ALL {
            criteria.insert(
                key.as_str().to_string(),
                serde_json::json!({
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["value", "reason"],
                    "properties": {
                        "value": {"type": "boolean", "description": key.question()},
                        "reason": {"type": "string"}
                    }
                }),
            );
        }
        let required: Vec<&str> = CriterionKey::ALL.iter().map(|k| k.as_str()).collect();

        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["symbol", "current_price", "historical_data", "criteria"],
            "properties": {
                "symbol": {"type": "string"},
                "current_price": {"type": "string", "description": "Latest market price with currency"},
                "historical_data": {
                    "type": "array",
                    "description": "Approximate monthly closing prices for the last 6 months, oldest first",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["date", "price"],
                        "properties": {
                            "date": {"type": "string", "description": "Month/Year, e.g. 'Oct 23'"},
                            "price": {"type": "number"}
                        }
                    }
                },
                "criteria": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": required,
                    "properties": criteria
                }
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_ANALYSIS,
            description: "Emit the stock analysis as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_ANALYSIS,
        }
    }

    fn system_prompt() -> String {
        [
            "You are a CFA-level equity analyst.",
            "Analyze the given stock symbol using the latest public information you have.",
            "Be conservative, data-driven and objective. Do not invent figures.",
            "If the data for a criterion is unclear, answer false and say why in the reason.",
            "Every one of the ten criteria MUST be present in the output.",
        ]
        .join("\n")
    }

    fn user_prompt(symbol: &str) -> String {
        let criteria: Vec<String> = CriterionKey::ALL
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{}. {}: {}.", i + 1, k.as_str(), k.question()))
            .collect();

        format!(
            "Analyze stock symbol: {symbol}.\n\n\
1. Evaluate the following 10 criteria strictly based on facts (true/false + reason).\n\
2. Provide approximate monthly closing prices for the last 6 months in historical_data.\n\n\
Criteria:\n{}",
            criteria.join("\n")
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_analysis(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<ProviderAnalysis>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_ANALYSIS {
                    let parsed = serde_json::from_value::<ProviderAnalysis>(input.clone())
                        .context("failed to decode tool_use.input into ProviderAnalysis")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for AnthropicAnalysisProvider {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    async fn fetch_analysis(&self, symbol: &str) -> anyhow::Result<AnalysisPayload> {
        let req = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: Self::user_prompt(symbol),
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        };

        let res = self.create_message(req).await?;

        if let Some(analysis) = Self::response_tool_analysis(&res)? {
            return analysis.validate_and_into_payload();
        }

        // Text replies should be rare with a forced tool choice.
        let text = Self::response_text(&res);
        json::parse_payload(&text).map_err(|err| {
            tracing::warn!(%symbol, error = %err, raw = %text, "Anthropic reply did not contain a usable analysis");
            if err.downcast_ref::<crate::error::AnalysisError>().is_some() {
                return err;
            }
            LlmDiagnosticsError::new(LlmVendor::Anthropic, "parse_text", "reply is not a valid analysis")
                .with_raw(&text)
                .into()
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}
