use thiserror::Error;

/// Longest error text handed back to a user or attached to a diagnostic.
pub const MAX_MESSAGE_CHARS: usize = 300;

/// Failures the engine reports to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Rejected input; raised before any state change.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    Provider(String),

    /// Provider payload lacks required criterion keys.
    #[error("analysis payload is missing required criteria: {}", missing.join(", "))]
    Schema { missing: Vec<&'static str> },

    #[error("storage error: {0}")]
    Persistence(String),
}

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn bounded(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
