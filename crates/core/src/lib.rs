pub mod domain;
pub mod error;
pub mod llm;
pub mod provider;
pub mod scoring;
pub mod session;
pub mod share;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_STORE_DIR: &str = ".tickerscore";

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ProviderKind {
        Anthropic,
        HttpJson,
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub store_dir: PathBuf,
        pub provider: ProviderKind,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: Option<String>,
        pub data_provider_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let provider = match std::env::var("ANALYSIS_PROVIDER").ok().as_deref() {
                None | Some("") | Some("anthropic") => ProviderKind::Anthropic,
                Some("http") => ProviderKind::HttpJson,
                Some(other) => anyhow::bail!(
                    "ANALYSIS_PROVIDER must be \"anthropic\" or \"http\" (got {other:?})"
                ),
            };

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                store_dir: std::env::var("SCORECARD_STORE_DIR")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
                provider,
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                data_provider_base_url: std::env::var("DATA_PROVIDER_BASE_URL").ok(),
                data_provider_api_key: std::env::var("DATA_PROVIDER_API_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_data_provider_base_url(&self) -> anyhow::Result<&str> {
            self.data_provider_base_url
                .as_deref()
                .context("DATA_PROVIDER_BASE_URL is required")
        }
    }
}
