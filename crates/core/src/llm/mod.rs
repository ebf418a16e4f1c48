pub mod anthropic;
pub mod error;
pub mod json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmVendor {
    Anthropic,
}
