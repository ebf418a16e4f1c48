use crate::domain::analysis::AnalysisPayload;
use crate::domain::contract::ProviderAnalysis;
use crate::error::{bounded, MAX_MESSAGE_CHARS};
use anyhow::Context;

/// Pulls the JSON object out of a model reply. Only the first fenced block
/// is considered when the reply has one.
pub fn extract_json(text: &str) -> Option<String> {
    let mut body = text.trim();
    if let Some((_, after_open)) = body.split_once("```") {
        body = after_open
            .split_once("```")
            .map_or(after_open, |(inside, _)| inside);
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| body[start..=end].to_string())
}

pub fn parse_payload(text: &str) -> anyhow::Result<AnalysisPayload> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<ProviderAnalysis>(&json_str)
        .with_context(|| {
            format!(
                "LLM output is not valid JSON for the analysis schema: {}",
                bounded(&json_str, MAX_MESSAGE_CHARS)
            )
        })?;
    parsed.validate_and_into_payload()
}
