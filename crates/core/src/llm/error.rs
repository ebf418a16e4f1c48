use crate::error::{bounded, MAX_MESSAGE_CHARS};
use crate::llm::LlmVendor;
use std::fmt;

/// Vendor failure with a bounded excerpt of what the vendor sent back.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub vendor: LlmVendor,
    pub stage: &'static str,
    pub detail: String,
    pub excerpt: Option<String>,
}

impl LlmDiagnosticsError {
    pub fn new(vendor: LlmVendor, stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            vendor,
            stage,
            detail: detail.into(),
            excerpt: None,
        }
    }

    pub fn with_raw(mut self, raw: &str) -> Self {
        let raw = raw.trim();
        if !raw.is_empty() {
            self.excerpt = Some(bounded(raw, MAX_MESSAGE_CHARS));
        }
        self
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (vendor={:?}, stage={}): {}",
            self.vendor, self.stage, self.detail
        )?;
        if let Some(excerpt) = &self.excerpt {
            write!(f, " (response: {excerpt})")?;
        }
        Ok(())
    }
}

impl std::error::Error for LlmDiagnosticsError {}
